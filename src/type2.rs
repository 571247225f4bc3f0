//! NDEF message retrieval from NFC Forum Type 2 tags (NTAG, MIFARE Ultralight)

use core::fmt;

use hal::blocking::delay::DelayMs;
use heapless::Vec;

use crate::chip::Chip;
use crate::clock::Clock;
use crate::interface::St25rInterface;
use crate::picc;
use crate::uid::Uid;
use crate::Error;

/// Largest NDEF message that is read
pub const MAX_NDEF_LEN: usize = 256;

/// Response window of a READ command
pub const READ_TIMEOUT_MS: u32 = 20;

/// NDEF message payload
pub type NdefMessage = Vec<u8, MAX_NDEF_LEN>;

const BLOCK_LEN: usize = 16;
const CC_PAGE: u8 = 3;
const CC_MAGIC: u8 = 0xE1;

// TLV types
const TLV_NULL: u8 = 0x00;
const TLV_NDEF: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;
const TLV_LONG_LENGTH: u8 = 0xFF;

/// Half-duplex exchange with the selected PICC; CRC_A is added and checked by the link
pub trait Transceive {
    /// Link error
    type Error;

    /// Sends `tx` and stores the response in `rx`, returning its length
    fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Reads the content of a tag that just completed selection
pub trait TagContentReader {
    /// Returns the tag's NDEF message, `None` if it holds none
    fn read_content<T>(
        &mut self,
        uid: &Uid,
        link: &mut T,
    ) -> Result<Option<NdefMessage>, ContentError<T::Error>>
    where
        T: Transceive;
}

/// Errors reading tag content
#[derive(Debug)]
pub enum ContentError<E> {
    /// The exchange with the PICC failed
    Link(E),
    /// No capability container
    NotNdefFormatted,
    /// A READ returned fewer than 16 bytes
    ShortRead(u8),
    /// The NDEF message is larger than `MAX_NDEF_LEN`
    TooLarge(usize),
}

impl<E> fmt::Display for ContentError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContentError::Link(e) => write!(f, "link error: {:?}", e),
            ContentError::NotNdefFormatted => f.write_str("tag is not NDEF formatted"),
            ContentError::ShortRead(page) => write!(f, "short read at page {}", page),
            ContentError::TooLarge(len) => write!(f, "NDEF message of {} bytes is too large", len),
        }
    }
}

/// Type 2 tag reader: capability container at page 3, TLV blocks from page 4
#[derive(Clone, Copy, Debug, Default)]
pub struct Type2Reader;

impl TagContentReader for Type2Reader {
    fn read_content<T>(
        &mut self,
        uid: &Uid,
        link: &mut T,
    ) -> Result<Option<NdefMessage>, ContentError<T::Error>>
    where
        T: Transceive,
    {
        let mut pages = Pages::new(link, CC_PAGE)?;

        let cc = pages.block;
        if cc[0] != CC_MAGIC {
            return Err(ContentError::NotNdefFormatted);
        }
        // data area size, in bytes, from page 4 on
        let data_len = usize::from(cc[2]) * 8;
        pages.skip_to_data(data_len);

        while let Some(tlv) = pages.next_byte()? {
            match tlv {
                TLV_NULL => continue,
                TLV_TERMINATOR => break,
                _ => {}
            }

            let len = match pages.tlv_length()? {
                Some(len) => len,
                None => break,
            };

            if tlv != TLV_NDEF {
                trace!("skipping TLV {:#04x} ({} bytes)", tlv, len);
                for _ in 0..len {
                    if pages.next_byte()?.is_none() {
                        return Ok(None);
                    }
                }
                continue;
            }

            if len == 0 {
                return Ok(None);
            }
            if len > MAX_NDEF_LEN {
                return Err(ContentError::TooLarge(len));
            }

            let mut message = NdefMessage::new();
            while message.len() < len {
                match pages.next_byte()? {
                    // capacity was checked above
                    Some(byte) => message.push(byte).map_err(|_| ContentError::TooLarge(len))?,
                    None => return Ok(None),
                }
            }

            debug!("{}: {} byte NDEF message", uid, message.len());
            return Ok(Some(message));
        }

        Ok(None)
    }
}

// Byte cursor over the tag memory, fetching four pages per READ
struct Pages<'l, T> {
    link: &'l mut T,
    page: u8,
    block: [u8; BLOCK_LEN],
    pos: usize,
    remaining: usize,
}

impl<'l, T> Pages<'l, T>
where
    T: Transceive,
{
    fn new(link: &'l mut T, page: u8) -> Result<Self, ContentError<T::Error>> {
        let mut pages = Pages {
            link,
            page,
            block: [0; BLOCK_LEN],
            pos: 0,
            remaining: 0,
        };
        pages.fetch()?;

        Ok(pages)
    }

    fn fetch(&mut self) -> Result<(), ContentError<T::Error>> {
        let n = self
            .link
            .transceive(&[picc::READ, self.page], &mut self.block)
            .map_err(ContentError::Link)?;

        if n != BLOCK_LEN {
            return Err(ContentError::ShortRead(self.page));
        }

        self.pos = 0;
        Ok(())
    }

    // the capability container block also holds pages 4 to 6
    fn skip_to_data(&mut self, data_len: usize) {
        self.pos = 4;
        self.remaining = data_len;
    }

    fn next_byte(&mut self) -> Result<Option<u8>, ContentError<T::Error>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        if self.pos == BLOCK_LEN {
            self.page = self.page.wrapping_add((BLOCK_LEN / 4) as u8);
            self.fetch()?;
        }

        let byte = self.block[self.pos];
        self.pos += 1;
        self.remaining -= 1;

        Ok(Some(byte))
    }

    // one byte, or 0xFF followed by a big endian u16
    fn tlv_length(&mut self) -> Result<Option<usize>, ContentError<T::Error>> {
        let first = match self.next_byte()? {
            Some(byte) => byte,
            None => return Ok(None),
        };

        if first != TLV_LONG_LENGTH {
            return Ok(Some(usize::from(first)));
        }

        match (self.next_byte()?, self.next_byte()?) {
            (Some(hi), Some(lo)) => Ok(Some(usize::from(hi) << 8 | usize::from(lo))),
            _ => Ok(None),
        }
    }
}

/// [`Transceive`] over a chip session, each exchange bounded by `READ_TIMEOUT_MS`
pub struct ChipLink<'a, IF, D, C: ?Sized> {
    chip: &'a mut Chip<IF, D>,
    clock: &'a C,
}

impl<'a, IF, D, C> ChipLink<'a, IF, D, C>
where
    C: ?Sized,
{
    /// Borrows the chip for a content read
    pub fn new(chip: &'a mut Chip<IF, D>, clock: &'a C) -> Self {
        ChipLink { chip, clock }
    }
}

impl<'a, E, IF, D, C> Transceive for ChipLink<'a, IF, D, C>
where
    IF: St25rInterface<Error = E>,
    D: DelayMs<u32>,
    C: Clock + ?Sized,
{
    type Error = Error<E>;

    fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Error<E>> {
        self.chip.transceive(tx, rx, self.clock, READ_TIMEOUT_MS)
    }
}
