//! I2C communication interface for ST25R

use hal::blocking::i2c;

use crate::interface::St25rInterface;

const FIFO_LOAD: u8 = 0x80;
const FIFO_READ: u8 = 0x9F;
const DIRECT_COMMAND: u8 = 0xC0;

// FIFO payload bytes carried per bus write
const FIFO_CHUNK: usize = 32;

/// I2C communication interface for ST25R
pub struct I2cInterface<I2C> {
    i2c: I2C,
    address: u8,
}

impl<E, I2C> I2cInterface<I2C>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
{
    /// Default 7-bit device address
    pub const DEFAULT_ADDRESS: u8 = 0x50;

    /// Creates a interface using the provided I2C peripheral and the default address.
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, Self::DEFAULT_ADDRESS)
    }

    /// Creates a interface using the provided I2C peripheral and device address.
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Releases the I2C peripheral
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<E, I2C> St25rInterface for I2cInterface<I2C>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
{
    type Error = E;

    fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error> {
        let mut buffer = [0];
        self.i2c
            .write_read(self.address, &[addr & 0x3F], &mut buffer)?;

        Ok(buffer[0])
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        self.i2c.write(self.address, &[addr & 0x3F, value])
    }

    fn send_command(&mut self, opcode: u8) -> Result<(), Self::Error> {
        self.i2c
            .write(self.address, &[DIRECT_COMMAND | (opcode & 0x3F)])
    }

    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut frame = [0; FIFO_CHUNK + 1];
        frame[0] = FIFO_LOAD;

        for chunk in bytes.chunks(FIFO_CHUNK) {
            frame[1..=chunk.len()].copy_from_slice(chunk);
            self.i2c.write(self.address, &frame[..=chunk.len()])?;
        }

        Ok(())
    }

    fn read_fifo<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], Self::Error> {
        if !buffer.is_empty() {
            self.i2c.write_read(self.address, &[FIFO_READ], buffer)?;
        }

        Ok(&*buffer)
    }
}
