//! SPI communication interface for ST25R

use hal::blocking::spi;
use hal::digital::v2::OutputPin;
use hal::spi::{Mode, Phase, Polarity};

use crate::interface::St25rInterface;

const REG_READ: u8 = 0b01 << 6;
const REG_WRITE: u8 = 0b00 << 6;
const FIFO_LOAD: u8 = 0b10 << 6;
const DIRECT_COMMAND: u8 = 0b11 << 6;

/// Errors raised by the SPI interface
#[derive(Debug)]
pub enum SpiError<E, PinE> {
    /// SPI bus error
    Spi(E),
    /// Chip select pin error
    Nss(PinE),
}

/// Left shift applied to the mode byte of every SPI frame
///
/// Some silicon revisions sample the mode byte two bits late. The shifted mode byte is sent as a
/// 16-bit big-endian word so the operation bits are not lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameShift {
    /// Mode byte sent as is
    None,
    /// Mode byte left-shifted by 2 bits
    Two,
}

impl FrameShift {
    /// Mode byte as it goes on the wire and how many bytes of it are used
    fn apply(self, byte: u8) -> ([u8; 2], usize) {
        match self {
            FrameShift::None => ([byte, 0], 1),
            FrameShift::Two => ((u16::from(byte) << 2).to_be_bytes(), 2),
        }
    }
}

/// Mode byte used to read the FIFO
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FifoReadMode {
    /// `0x9F`, ST25R3916 / ST25R3916B
    Standard,
    /// `0xBF`, older ST25R parts
    Legacy,
}

impl FifoReadMode {
    fn mode_byte(self) -> u8 {
        match self {
            FifoReadMode::Standard => 0x9F,
            FifoReadMode::Legacy => 0xBF,
        }
    }
}

/// SPI communication interface for ST25R
pub struct SpiInterface<SPI, NSS> {
    spi: SPI,
    nss: NSS,
    shift: FrameShift,
    fifo_read: FifoReadMode,
}

impl<E, PinE, SPI, NSS> SpiInterface<SPI, NSS>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    NSS: OutputPin<Error = PinE>,
{
    /// SPI mode. Pass to the platform SPI implementation to configure the bus correctly for
    /// ST25R.
    pub const MODE: Mode = Mode {
        polarity: Polarity::IdleLow,
        phase: Phase::CaptureOnSecondTransition,
    };

    /// Creates a interface using the provided SPI peripheral and NSS pin.
    pub fn new(spi: SPI, nss: NSS) -> Self {
        Self {
            spi,
            nss,
            shift: FrameShift::None,
            fifo_read: FifoReadMode::Standard,
        }
    }

    /// Creates a interface for silicon that needs its mode bytes shifted by 2 bits.
    pub fn new_shifted(spi: SPI, nss: NSS) -> Self {
        Self {
            shift: FrameShift::Two,
            ..Self::new(spi, nss)
        }
    }

    /// Selects the FIFO read mode byte
    pub fn with_fifo_read_mode(mut self, mode: FifoReadMode) -> Self {
        self.fifo_read = mode;
        self
    }

    /// Releases the SPI peripheral and NSS pin
    pub fn release(self) -> (SPI, NSS) {
        (self.spi, self.nss)
    }

    fn with_nss_low<F, T>(&mut self, f: F) -> Result<T, SpiError<E, PinE>>
    where
        F: FnOnce(&mut SPI) -> Result<T, E>,
    {
        self.nss.set_low().map_err(SpiError::Nss)?;
        let result = f(&mut self.spi).map_err(SpiError::Spi);
        self.nss.set_high().map_err(SpiError::Nss)?;

        result
    }
}

impl<E, PinE, SPI, NSS> St25rInterface for SpiInterface<SPI, NSS>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    NSS: OutputPin<Error = PinE>,
{
    type Error = SpiError<E, PinE>;

    fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error> {
        let (mode, len) = self.shift.apply(REG_READ | (addr & 0x3F));

        self.with_nss_low(move |spi| {
            spi.write(&mode[..len])?;

            let mut buffer = [0];
            spi.transfer(&mut buffer)?;

            Ok(buffer[0])
        })
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        let (mode, len) = self.shift.apply(REG_WRITE | (addr & 0x3F));
        let mut frame = [0; 3];
        frame[..len].copy_from_slice(&mode[..len]);
        frame[len] = value;

        self.with_nss_low(move |spi| spi.write(&frame[..=len]))
    }

    fn send_command(&mut self, opcode: u8) -> Result<(), Self::Error> {
        let (mode, len) = self.shift.apply(DIRECT_COMMAND | (opcode & 0x3F));

        self.with_nss_low(move |spi| spi.write(&mode[..len]))
    }

    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let (mode, len) = self.shift.apply(FIFO_LOAD);

        self.with_nss_low(move |spi| {
            spi.write(&mode[..len])?;
            spi.write(bytes)
        })
    }

    fn read_fifo<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], Self::Error> {
        if buffer.is_empty() {
            return Ok(&*buffer);
        }

        let (mode, len) = self.shift.apply(self.fifo_read.mode_byte());

        self.with_nss_low(move |spi| {
            spi.write(&mode[..len])?;

            for slot in buffer.iter_mut() {
                *slot = 0;
            }
            spi.transfer(buffer)?;

            Ok(&*buffer)
        })
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::pin::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
    use embedded_hal_mock::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    use super::*;

    fn selected(times: usize) -> PinMock {
        let mut expectations = vec![];
        for _ in 0..times {
            expectations.push(PinTransaction::set(PinState::Low));
            expectations.push(PinTransaction::set(PinState::High));
        }
        PinMock::new(&expectations)
    }

    #[test]
    fn register_read_uses_read_mode() {
        let spi = SpiMock::new(&[
            SpiTransaction::write(vec![0x7F]),
            SpiTransaction::transfer(vec![0x00], vec![0x2A]),
        ]);
        let nss = selected(1);
        let mut iface = SpiInterface::new(spi, nss);

        assert_eq!(iface.read_register(0x3F).unwrap(), 0x2A);

        let (mut spi, mut nss) = iface.release();
        spi.done();
        nss.done();
    }

    #[test]
    fn register_write_and_command() {
        let spi = SpiMock::new(&[
            SpiTransaction::write(vec![0x03, 0x08]),
            SpiTransaction::write(vec![0xC1]),
        ]);
        let nss = selected(2);
        let mut iface = SpiInterface::new(spi, nss);

        iface.write_register(0x03, 0x08).unwrap();
        iface.send_command(0xC1).unwrap();

        let (mut spi, mut nss) = iface.release();
        spi.done();
        nss.done();
    }

    #[test]
    fn fifo_load_and_read() {
        let spi = SpiMock::new(&[
            SpiTransaction::write(vec![0x80]),
            SpiTransaction::write(vec![0x93, 0x20]),
            SpiTransaction::write(vec![0x9F]),
            SpiTransaction::transfer(vec![0x00, 0x00], vec![0x44, 0x00]),
        ]);
        let nss = selected(2);
        let mut iface = SpiInterface::new(spi, nss);

        iface.write_fifo(&[0x93, 0x20]).unwrap();
        let mut buffer = [0xFF; 2];
        assert_eq!(iface.read_fifo(&mut buffer).unwrap(), &[0x44, 0x00]);

        let (mut spi, mut nss) = iface.release();
        spi.done();
        nss.done();
    }

    #[test]
    fn legacy_fifo_read_mode() {
        let spi = SpiMock::new(&[
            SpiTransaction::write(vec![0xBF]),
            SpiTransaction::transfer(vec![0x00], vec![0x08]),
        ]);
        let nss = selected(1);
        let mut iface = SpiInterface::new(spi, nss).with_fifo_read_mode(FifoReadMode::Legacy);

        let mut buffer = [0; 1];
        assert_eq!(iface.read_fifo(&mut buffer).unwrap(), &[0x08]);

        let (mut spi, mut nss) = iface.release();
        spi.done();
        nss.done();
    }

    #[test]
    fn shifted_frames_keep_operation_bits() {
        let spi = SpiMock::new(&[
            // 0x58 << 2 = 0x0160: read mode, register 0x18
            SpiTransaction::write(vec![0x01, 0x60]),
            SpiTransaction::transfer(vec![0x00], vec![0x10]),
            // 0xC2 << 2 = 0x0308: direct command
            SpiTransaction::write(vec![0x03, 0x08]),
            // 0x03 << 2 = 0x000C: write mode, register 0x03
            SpiTransaction::write(vec![0x00, 0x0C, 0x08]),
            // 0x80 << 2 = 0x0200: FIFO load
            SpiTransaction::write(vec![0x02, 0x00]),
            SpiTransaction::write(vec![0x52]),
            // 0x9F << 2 = 0x027C: FIFO read
            SpiTransaction::write(vec![0x02, 0x7C]),
            SpiTransaction::transfer(vec![0x00, 0x00], vec![0x44, 0x00]),
        ]);
        let nss = selected(5);
        let mut iface = SpiInterface::new_shifted(spi, nss);

        assert_eq!(iface.read_register(0x18).unwrap(), 0x10);
        iface.send_command(0xC2).unwrap();
        iface.write_register(0x03, 0x08).unwrap();
        iface.write_fifo(&[0x52]).unwrap();
        let mut buffer = [0; 2];
        assert_eq!(iface.read_fifo(&mut buffer).unwrap(), &[0x44, 0x00]);

        let (mut spi, mut nss) = iface.release();
        spi.done();
        nss.done();
    }
}
