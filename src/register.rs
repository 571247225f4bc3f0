//! ST25R3916 register map, direct commands and interrupt bits

pub const IO_CONF1: u8 = 0x00;
pub const IO_CONF2: u8 = 0x01;
pub const OP_CONTROL: u8 = 0x02;
pub const MODE: u8 = 0x03;
pub const BIT_RATE: u8 = 0x04;
pub const ISO14443A_NFC: u8 = 0x05;
pub const RX_CONF1: u8 = 0x0A;
pub const RX_CONF2: u8 = 0x0B;
pub const RX_CONF3: u8 = 0x0C;
pub const RX_CONF4: u8 = 0x0D;
pub const NO_RESPONSE_TIMER1: u8 = 0x0F;
pub const NO_RESPONSE_TIMER2: u8 = 0x10;
pub const IRQ_MASK_MAIN: u8 = 0x15;
pub const IRQ_MASK_TIMER_NFC: u8 = 0x16;
pub const IRQ_MASK_ERROR_WUP: u8 = 0x17;
pub const IRQ_MAIN: u8 = 0x18;
pub const IRQ_TIMER_NFC: u8 = 0x19;
pub const IRQ_ERROR_WUP: u8 = 0x1A;
pub const FIFO_STATUS1: u8 = 0x1B;
pub const FIFO_STATUS2: u8 = 0x1C;
pub const NUM_TX_BYTES1: u8 = 0x1E;
pub const NUM_TX_BYTES2: u8 = 0x1F;
pub const AD_CONVERTER: u8 = 0x21;
pub const TX_DRIVER: u8 = 0x28;
pub const REGULATOR_CONTROL: u8 = 0x2A;
pub const IC_IDENTITY: u8 = 0x3F;

// OP_CONTROL bits
pub const OSC_EN: u8 = 1 << 7;
pub const RX_EN: u8 = 1 << 6;
pub const TX_EN: u8 = 1 << 3;

// MODE: NFC-A initiator
pub const MODE_NFCA: u8 = 0x08;
// BIT_RATE: 106 kbit/s in both directions
pub const BIT_RATE_106: u8 = 0x00;

// NUM_TX_BYTES2: transmit a 7-bit short frame
pub const SHORT_FRAME: u8 = 1 << 7;

/// Identity of a chip whose data bytes come back rotated left by two bits
pub const SHIFTED_IDENTITY: u8 = 0x28;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SetDefault = 0xC1,
    ClearFifo = 0xC2,
    TransmitWithCrc = 0xC4,
    TransmitWithoutCrc = 0xC5,
    MeasureAmplitude = 0xD3,
}

/// Interrupt status, `IRQ_MAIN | IRQ_TIMER_NFC << 8 | IRQ_ERROR_WUP << 16`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Irq(pub u32);

impl Irq {
    // IRQ_MAIN
    pub const RXE: u32 = 1 << 4;
    pub const TXE: u32 = 1 << 3;
    pub const COL: u32 = 1 << 2;
    pub const RX_REST: u32 = 1 << 1;
    // IRQ_TIMER_NFC
    pub const NRE: u32 = 1 << (8 + 6);
    // IRQ_ERROR_WUP
    pub const CRC: u32 = 1 << (16 + 7);
    pub const PAR: u32 = 1 << (16 + 6);
    pub const ERR2: u32 = 1 << (16 + 5);
    pub const ERR1: u32 = 1 << (16 + 4);

    pub const ERRORS: u32 = Self::CRC | Self::PAR | Self::ERR2 | Self::ERR1;

    pub fn from_registers(main: u8, timer_nfc: u8, error_wup: u8) -> Self {
        Irq(u32::from(main) | u32::from(timer_nfc) << 8 | u32::from(error_wup) << 16)
    }

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits != 0
    }

    /// Collision or a partially received frame
    pub fn collision(self) -> bool {
        self.contains(Self::COL | Self::RX_REST)
    }

    /// Reception finished, with or without data
    pub fn frame_ended(self) -> bool {
        self.contains(Self::RXE | Self::NRE | Self::ERRORS)
    }

    /// Bytes to write to the mask registers to enable `bits` and mask everything else
    pub fn mask_registers(bits: u32) -> [u8; 3] {
        let masked = !bits;
        [masked as u8, (masked >> 8) as u8, (masked >> 16) as u8]
    }
}
