// Commands
pub const REQA: u8 = 0x26;
pub const WUPA: u8 = 0x52;
pub const READ: u8 = 0x30;

// Cascade levels
pub const SEL_CL1: u8 = 0x93;
pub const SEL_CL2: u8 = 0x95;
pub const SEL_CL3: u8 = 0x97;

// Number of valid bits
pub const NVB_ANTICOLLISION: u8 = 0x20;
pub const NVB_SELECT: u8 = 0x70;

// Cascade tag
pub const CT: u8 = 0x88;

// SAK bits
pub const SAK_ISO14443_4: u8 = 1 << 5;

/// Block Check Character of a 4 byte UID chunk
pub fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
