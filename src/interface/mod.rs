//! Communication interfaces for ST25R

/// SPI communication interface
pub mod spi;

/// I2C communication interface
pub mod i2c;

pub use self::i2c::I2cInterface;
pub use self::spi::{FifoReadMode, FrameShift, SpiError, SpiInterface};

/// Trait for implementing a communication interface for ST25R
///
/// Every bus presents the same logical contract; framing (mode bytes, pseudo-registers) is the
/// implementation's business.
pub trait St25rInterface {
    /// Type of the error the interface may return.
    type Error;

    /// Reads a single register
    fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error>;

    /// Writes a single register
    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error>;

    /// Sends a direct command
    fn send_command(&mut self, opcode: u8) -> Result<(), Self::Error>;

    /// Loads bytes into the FIFO
    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Reads `buffer.len()` bytes from the FIFO
    fn read_fifo<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], Self::Error>;

    /// Performs a read-modify-write on a register
    fn modify_register<F>(&mut self, addr: u8, f: F) -> Result<(), Self::Error>
    where
        F: FnOnce(u8) -> u8,
    {
        let byte = self.read_register(addr)?;
        self.write_register(addr, f(byte))?;
        Ok(())
    }
}

impl<'a, IF> St25rInterface for &'a mut IF
where
    IF: St25rInterface,
{
    type Error = IF::Error;

    fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error> {
        (**self).read_register(addr)
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        (**self).write_register(addr, value)
    }

    fn send_command(&mut self, opcode: u8) -> Result<(), Self::Error> {
        (**self).send_command(opcode)
    }

    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).write_fifo(bytes)
    }

    fn read_fifo<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], Self::Error> {
        (**self).read_fifo(buffer)
    }
}
