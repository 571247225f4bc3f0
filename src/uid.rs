//! Tag identifiers

use core::fmt;
use core::str::FromStr;

use crate::picc;

/// Longest UID, triple size
pub const MAX_UID_LEN: usize = 10;

/// ISO14443A UID: 4 (single), 7 (double) or 10 (triple size) bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid {
    bytes: [u8; MAX_UID_LEN],
    len: u8,
}

impl Uid {
    /// Builds a UID from its bytes; `None` unless `bytes` is 4, 7 or 10 bytes long
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            4 | 7 | 10 => {
                let mut uid = Uid::empty();
                uid.bytes[..bytes.len()].copy_from_slice(bytes);
                uid.len = bytes.len() as u8;
                Some(uid)
            }
            _ => None,
        }
    }

    pub(crate) const fn empty() -> Self {
        Uid {
            bytes: [0; MAX_UID_LEN],
            len: 0,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.bytes = [0; MAX_UID_LEN];
        self.len = 0;
    }

    /// Appends the UID bytes of one cascade level, dropping the cascade tag
    ///
    /// Returns `true` when the chunk announced further cascade levels.
    pub(crate) fn push_level(&mut self, chunk: &[u8; 4]) -> bool {
        let (more, bytes) = if chunk[0] == picc::CT {
            (true, &chunk[1..])
        } else {
            (false, &chunk[..])
        };

        let start = usize::from(self.len);
        let end = (start + bytes.len()).min(MAX_UID_LEN);
        self.bytes[start..end].copy_from_slice(&bytes[..end - start]);
        self.len = end as u8;

        more
    }

    /// The bytes of the UID
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// `true` while no byte has been accumulated
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of cascade levels needed to select a PICC with this UID
    pub fn cascade_levels(&self) -> u8 {
        match self.len {
            0..=4 => 1,
            5..=7 => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

/// Errors parsing a `04-A2-1B-3C` style UID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UidParseError {
    /// A part between dashes is not two characters long
    PartLength,
    /// A part is not hexadecimal
    NotHex,
    /// The UID is not 4, 7 or 10 bytes long
    Length,
}

impl fmt::Display for UidParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UidParseError::PartLength => {
                f.write_str("each part (separated by '-') of the UID must be two characters long")
            }
            UidParseError::NotHex => f.write_str("valid characters for UID parts are 0123456789ABCDEF"),
            UidParseError::Length => f.write_str("a UID is 4, 7 or 10 bytes long"),
        }
    }
}

impl FromStr for Uid {
    type Err = UidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; MAX_UID_LEN];
        let mut len = 0;

        for part in s.split('-') {
            if part.len() != 2 {
                return Err(UidParseError::PartLength);
            }
            if len == MAX_UID_LEN {
                return Err(UidParseError::Length);
            }
            bytes[len] = u8::from_str_radix(part, 16).map_err(|_| UidParseError::NotHex)?;
            len += 1;
        }

        Uid::from_bytes(&bytes[..len]).ok_or(UidParseError::Length)
    }
}

/// A PICC that completed anticollision and selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag {
    /// Complete UID
    pub uid: Uid,
    /// Answer To reQuest A
    pub atqa: [u8; 2],
    /// Select AcKnowledge of the last cascade level
    pub sak: u8,
}

impl Tag {
    /// Is the PICC compliant with ISO/IEC 14443-4?
    pub fn is_compliant(&self) -> bool {
        self.sak & picc::SAK_ISO14443_4 != 0
    }

    /// Does the SAK announce a Type 2 (NTAG / Ultralight) tag?
    pub fn is_type2(&self) -> bool {
        self.sak == 0x00
    }
}
