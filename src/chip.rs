//! Chip session: reset, identity, configuration and RF field control

use generic_array::{ArrayLength, GenericArray};
use hal::blocking::delay::DelayMs;
use hal::blocking::{i2c, spi};
use hal::digital::v2::OutputPin;

use crate::clock::Clock;
use crate::interface::{I2cInterface, SpiInterface, St25rInterface};
use crate::register::{self, Command, Irq};
use crate::Error;

/// Highest logical RF power level
pub const MAX_RF_POWER: u8 = 15;

const RESET_SETTLE_MS: u32 = 5;
const FIELD_SETTLE_MS: u32 = 10;
const MEASURE_SETTLE_MS: u32 = 1;

// Interrupts the acquisition logic looks at; everything else stays masked
const ENABLED_IRQS: u32 =
    Irq::RXE | Irq::TXE | Irq::COL | Irq::RX_REST | Irq::NRE | Irq::ERRORS;

/// Chip identified at reset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// ST25R3916
    St25r3916,
    /// ST25R3916B
    St25r3916b,
}

impl Variant {
    /// Maps an IC identity register value (after shift correction) to a chip
    pub fn from_identity(identity: u8) -> Option<Self> {
        match identity {
            0x05 => Some(Variant::St25r3916),
            0x0A => Some(Variant::St25r3916b),
            // IC type in the upper five bits, silicon revision in the lower three
            id if id >> 3 == 0b00101 => Some(Variant::St25r3916),
            _ => None,
        }
    }
}

/// How a frame is put on air
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Framing {
    /// 7-bit short frame (REQA / WUPA)
    Short,
    /// Whole bytes, no CRC (anticollision)
    Plain,
    /// Whole bytes followed by CRC_A (SELECT, READ)
    WithCrc,
}

/// ST25R session
///
/// Owns the bus interface and remembers what was learned about the silicon at reset: the
/// detected variant and the bit-shift correction applied to every register and FIFO data byte.
/// Shifted silicon moves each data byte two bit positions to the left, carrying the top two bits
/// around to the bottom, so writes are rotated left and reads rotated right by the same factor.
/// Register addresses and direct commands are sent as is.
pub struct Chip<IF, D> {
    iface: IF,
    delay: D,
    shift: u8,
    rf_power: u8,
    field_on: bool,
    variant: Option<Variant>,
}

impl<SPI, NSS, D> Chip<SpiInterface<SPI, NSS>, D> {
    /// Creates a session using the provided SPI peripheral and NSS pin.
    pub fn new_spi<E, PinE>(spi: SPI, nss: NSS, delay: D) -> Self
    where
        SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
        NSS: OutputPin<Error = PinE>,
    {
        Chip::new(SpiInterface::new(spi, nss), delay)
    }
}

impl<I2C, D> Chip<I2cInterface<I2C>, D> {
    /// Creates a session using the provided I2C peripheral at the default address.
    pub fn new_i2c<E>(i2c: I2C, delay: D) -> Self
    where
        I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
    {
        Chip::new(I2cInterface::new(i2c), delay)
    }
}

impl<IF, D> Chip<IF, D> {
    /// Creates a session with the provided interface. The chip is not touched until
    /// [`reset`](Chip::reset).
    pub fn new(iface: IF, delay: D) -> Self {
        Chip {
            iface,
            delay,
            shift: 0,
            rf_power: MAX_RF_POWER,
            field_on: false,
            variant: None,
        }
    }

    /// Variant detected by the last successful reset
    pub fn variant(&self) -> Option<Variant> {
        self.variant
    }

    /// Bit-shift correction factor, 0 or 2
    pub fn shift(&self) -> u8 {
        self.shift
    }

    /// Logical RF power level, 0 to 15
    pub fn rf_power(&self) -> u8 {
        self.rf_power
    }

    /// Is the RF field on?
    pub fn is_field_on(&self) -> bool {
        self.field_on
    }

    /// Releases the interface and delay
    pub fn release(self) -> (IF, D) {
        (self.iface, self.delay)
    }

    fn tx_driver(&self) -> u8 {
        (MAX_RF_POWER - self.rf_power) << 4
    }
}

impl<E, IF, D> Chip<IF, D>
where
    IF: St25rInterface<Error = E>,
    D: DelayMs<u32>,
{
    /// Restores register defaults and verifies the chip identity
    ///
    /// Detects the bit-shift correction factor for this session. On an identity mismatch the
    /// chip must not be configured.
    pub fn reset(&mut self) -> Result<Variant, Error<E>> {
        self.variant = None;
        self.field_on = false;
        self.shift = 0;

        self.command(Command::SetDefault).map_err(Error::Interface)?;
        self.delay.delay_ms(RESET_SETTLE_MS);

        let raw = self
            .iface
            .read_register(register::IC_IDENTITY)
            .map_err(Error::Interface)?;
        let shift = if raw == register::SHIFTED_IDENTITY { 2 } else { 0 };

        match Variant::from_identity(raw.rotate_right(shift.into())) {
            Some(variant) => {
                debug!("IC identity {:#04x}: {:?}, shift {}", raw, variant, shift);
                self.shift = shift;
                self.variant = Some(variant);
                Ok(variant)
            }
            None => {
                error!("unexpected IC identity {:#04x}", raw);
                Err(Error::InvalidDevice(raw))
            }
        }
    }

    /// Configures the chip as a 106 kbit/s NFC-A initiator
    pub fn configure(&mut self) -> Result<(), Error<E>> {
        if self.variant.is_none() {
            return Err(Error::NotInitialized);
        }

        let settings = [
            (register::IO_CONF1, 0x00),
            (register::IO_CONF2, 0x00),
            (register::MODE, register::MODE_NFCA),
            (register::ISO14443A_NFC, 0x00),
            (register::BIT_RATE, register::BIT_RATE_106),
            (register::RX_CONF1, 0x04),
            (register::RX_CONF2, 0x2D),
            (register::RX_CONF3, 0x00),
            (register::RX_CONF4, 0x00),
            (register::NO_RESPONSE_TIMER1, 0xFF),
            (register::NO_RESPONSE_TIMER2, 0x0F),
            (register::REGULATOR_CONTROL, 0x03),
        ];
        for &(addr, value) in settings.iter() {
            self.write_register(addr, value).map_err(Error::Interface)?;
        }

        let [main, timer_nfc, error_wup] = Irq::mask_registers(ENABLED_IRQS);
        self.write_register(register::IRQ_MASK_MAIN, main)
            .map_err(Error::Interface)?;
        self.write_register(register::IRQ_MASK_TIMER_NFC, timer_nfc)
            .map_err(Error::Interface)?;
        self.write_register(register::IRQ_MASK_ERROR_WUP, error_wup)
            .map_err(Error::Interface)?;

        let tx_driver = self.tx_driver();
        self.write_register(register::TX_DRIVER, tx_driver)
            .map_err(Error::Interface)
    }

    /// Sets the logical RF power, 0 (weakest) to 15 (strongest)
    ///
    /// Levels above 15 are clamped. The transmit driver is only written once the identity has
    /// been verified; otherwise the level is applied by [`configure`](Chip::configure).
    pub fn set_rf_power(&mut self, level: u8) -> Result<(), Error<E>> {
        self.rf_power = level.min(MAX_RF_POWER);

        if self.variant.is_some() {
            let tx_driver = self.tx_driver();
            self.write_register(register::TX_DRIVER, tx_driver)
                .map_err(Error::Interface)?;
        }

        Ok(())
    }

    /// Turns the RF field on: oscillator first, then receiver and transmitter
    pub fn field_on(&mut self) -> Result<(), Error<E>> {
        if self.variant.is_none() {
            return Err(Error::NotInitialized);
        }

        debug!("turning RF field on");
        self.modify_register(register::OP_CONTROL, |r| r | register::OSC_EN)
            .map_err(Error::Interface)?;
        self.delay.delay_ms(FIELD_SETTLE_MS);

        self.modify_register(register::OP_CONTROL, |r| {
            r | register::RX_EN | register::TX_EN
        })
        .map_err(Error::Interface)?;
        self.delay.delay_ms(FIELD_SETTLE_MS);

        self.field_on = true;
        Ok(())
    }

    /// Turns the RF field off. Does nothing if it is already off.
    pub fn field_off(&mut self) -> Result<(), Error<E>> {
        if !self.field_on {
            return Ok(());
        }

        debug!("turning RF field off");
        self.write_register(register::OP_CONTROL, 0x00)
            .map_err(Error::Interface)?;
        self.field_on = false;

        Ok(())
    }

    /// Re-reads the identity register and checks it still names the chip found at reset
    pub fn verify_identity(&mut self) -> Result<bool, E> {
        let identity = self.read_register(register::IC_IDENTITY)?;
        let found = Variant::from_identity(identity);

        Ok(found.is_some() && found == self.variant)
    }

    /// Measures the RF field amplitude, raw A/D converter reading
    pub fn measure_amplitude(&mut self) -> Result<u8, Error<E>> {
        self.command(Command::MeasureAmplitude)
            .map_err(Error::Interface)?;
        self.delay.delay_ms(MEASURE_SETTLE_MS);

        self.read_register(register::AD_CONVERTER)
            .map_err(Error::Interface)
    }

    /// Sends `tx` with CRC_A and waits, in 1 ms steps, for the response
    ///
    /// Returns the number of bytes copied into `rx`.
    pub fn transceive<C>(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        clock: &C,
        timeout_ms: u32,
    ) -> Result<usize, Error<E>>
    where
        C: Clock + ?Sized,
    {
        self.transmit(tx, Framing::WithCrc)
            .map_err(Error::Interface)?;
        let deadline = clock.now_ms() + u64::from(timeout_ms);

        loop {
            let irq = self.read_irqs().map_err(Error::Interface)?;

            if irq.contains(Irq::ERRORS) {
                return Err(Error::IncompleteFrame);
            }

            if irq.contains(Irq::RXE) {
                let available = self.fifo_len().map_err(Error::Interface)?;
                let n = available.min(rx.len());
                self.read_fifo(&mut rx[..n]).map_err(Error::Interface)?;

                return Ok(n);
            }

            if irq.contains(Irq::NRE) || clock.now_ms() >= deadline {
                return Err(Error::Timeout);
            }

            self.delay.delay_ms(1);
        }
    }

    pub(crate) fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    pub(crate) fn read_register(&mut self, addr: u8) -> Result<u8, E> {
        Ok(self.iface.read_register(addr)?.rotate_right(self.shift.into()))
    }

    pub(crate) fn write_register(&mut self, addr: u8, value: u8) -> Result<(), E> {
        self.iface
            .write_register(addr, value.rotate_left(self.shift.into()))
    }

    fn modify_register<F>(&mut self, addr: u8, f: F) -> Result<(), E>
    where
        F: FnOnce(u8) -> u8,
    {
        let value = self.read_register(addr)?;
        self.write_register(addr, f(value))
    }

    fn command(&mut self, command: Command) -> Result<(), E> {
        self.iface.send_command(command as u8)
    }

    pub(crate) fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), E> {
        if self.shift == 0 {
            return self.iface.write_fifo(bytes);
        }

        let mut shifted = [0; 16];
        for chunk in bytes.chunks(shifted.len()) {
            for (dst, src) in shifted.iter_mut().zip(chunk) {
                *dst = src.rotate_left(self.shift.into());
            }
            self.iface.write_fifo(&shifted[..chunk.len()])?;
        }

        Ok(())
    }

    pub(crate) fn read_fifo<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], E> {
        let n = self.iface.read_fifo(buffer)?.len();

        for b in buffer[..n].iter_mut() {
            *b = b.rotate_right(self.shift.into());
        }

        Ok(&buffer[..n])
    }

    /// Reads exactly `N` bytes out of the FIFO
    pub(crate) fn read_frame<N>(&mut self) -> Result<GenericArray<u8, N>, E>
    where
        N: ArrayLength<u8>,
    {
        let mut frame: GenericArray<u8, N> = GenericArray::default();
        self.read_fifo(frame.as_mut_slice())?;

        Ok(frame)
    }

    /// Number of bytes waiting in the FIFO
    pub(crate) fn fifo_len(&mut self) -> Result<usize, E> {
        let low = self.read_register(register::FIFO_STATUS1)?;
        let high = self.read_register(register::FIFO_STATUS2)?;

        Ok(usize::from(high & 0x03) << 8 | usize::from(low))
    }

    /// Reads, and thereby clears, the interrupt status registers
    pub(crate) fn read_irqs(&mut self) -> Result<Irq, E> {
        let main = self.read_register(register::IRQ_MAIN)?;
        let timer_nfc = self.read_register(register::IRQ_TIMER_NFC)?;
        let error_wup = self.read_register(register::IRQ_ERROR_WUP)?;

        Ok(Irq::from_registers(main, timer_nfc, error_wup))
    }

    /// Clears FIFO and interrupts, loads `frame` and starts the transmission
    pub(crate) fn transmit(&mut self, frame: &[u8], framing: Framing) -> Result<(), E> {
        self.command(Command::ClearFifo)?;
        self.read_irqs()?;
        self.write_fifo(frame)?;

        let (bytes, bits) = match framing {
            Framing::Short => (0, register::SHORT_FRAME),
            Framing::Plain | Framing::WithCrc => (frame.len() as u8, 0),
        };
        self.write_register(register::NUM_TX_BYTES2, bits)?;
        self.write_register(register::NUM_TX_BYTES1, bytes)?;

        trace!("transmit {:02x?} ({:?})", frame, framing);
        self.command(match framing {
            Framing::WithCrc => Command::TransmitWithCrc,
            Framing::Short | Framing::Plain => Command::TransmitWithoutCrc,
        })
    }
}
