//! A platform agnostic driver to interface the ST25R3916 / ST25R3916B (NFC reader)
//!
//! This driver was built using [`embedded-hal`] traits. It acquires ISO14443A (NFC-A) tags one
//! at a time: wake-up, cascade-level anticollision, select, debounced presence tracking and
//! counted recovery of an unresponsive chip. The content of NFC Forum Type 2 tags can
//! optionally be read once they appear.
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal/~0.2
//!
//! # Usage
//!
//! Build a [`Chip`] over SPI or I2C, hand it to [`St25r`] together with a [`Clock`] and a
//! [`Listener`], call [`St25r::setup`] once and then [`St25r::service`] in a loop (or
//! [`St25r::update`] at the poll interval and [`St25r::tick`] in between).
//!
//! ```no_run
//! use embedded_hal::blocking::delay::DelayMs;
//! use embedded_hal::blocking::spi::{Transfer, Write};
//! use embedded_hal::digital::v2::OutputPin;
//! use st25r::{Chip, Clock, Config, Listener, St25r, Uid};
//!
//! struct Printer;
//!
//! impl Listener for Printer {
//!     fn on_tag_appeared(&mut self, uid: &Uid) {
//!         println!("+ {}", uid);
//!     }
//!
//!     fn on_tag_removed(&mut self, uid: &Uid) {
//!         println!("- {}", uid);
//!     }
//! }
//!
//! fn run<SPI, NSS, D, C, E, PinE>(spi: SPI, nss: NSS, delay: D, clock: C)
//! where
//!     SPI: Transfer<u8, Error = E> + Write<u8, Error = E>,
//!     NSS: OutputPin<Error = PinE>,
//!     D: DelayMs<u32>,
//!     C: Clock,
//!     E: core::fmt::Debug,
//!     PinE: core::fmt::Debug,
//! {
//!     let chip = Chip::new_spi(spi, nss, delay);
//!     let mut reader = St25r::new(chip, clock, Printer, Config::default());
//!
//!     reader.setup().unwrap();
//!     loop {
//!         reader.service().unwrap();
//!     }
//! }
//! ```
//!
//! # References
//!
//! - [Identification cards - Contactless integrated circuit(s) cards - Proximity cards - Part 3:
//! Initialization and anticollision][1]
//! - [ST25R3916 data sheet][2]
//! - [NFC Forum Type 2 Tag specification][3]
//!
//! [1]: http://wg8.de/wg8n1496_17n3613_Ballot_FCD14443-3.pdf
//! [2]: https://www.st.com/resource/en/datasheet/st25r3916.pdf
//! [3]: https://nfc-forum.org/build/specifications

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]

extern crate embedded_hal as hal;
#[macro_use]
extern crate log;

pub mod interface;
pub mod type2;

mod anticollision;
mod chip;
mod clock;
mod config;
mod driver;
mod health;
mod irq;
mod listener;
mod picc;
mod presence;
mod register;
mod uid;

pub use crate::anticollision::{
    Anticollision, CascadeLevel, IrqSignal, PollCycle, WakeCommand, LEVEL_TIMEOUT_MS,
    WUPA_TIMEOUT_MS,
};
pub use crate::chip::{Chip, Variant, MAX_RF_POWER};
pub use crate::clock::Clock;
#[cfg(feature = "std")]
pub use crate::clock::StdClock;
pub use crate::config::{Config, ConfigError, MAX_WATCHED_UIDS};
pub use crate::driver::{NoPin, St25r};
pub use crate::health::{
    AttemptOutcome, CheckOutcome, Status, Supervisor, MAX_FAILED_CHECKS, MAX_REINIT_ATTEMPTS,
};
pub use crate::irq::IrqFlag;
pub use crate::listener::Listener;
pub use crate::presence::{
    PresenceEvent, PresenceState, PresenceTracker, UidWatch, REMOVAL_THRESHOLD,
};
pub use crate::uid::{Tag, Uid, UidParseError, MAX_UID_LEN};

/// Errors
#[derive(Debug)]
pub enum Error<E> {
    /// Interface error
    Interface(E),
    /// The IC identity register names no known chip; carries the raw value
    InvalidDevice(u8),
    /// The chip identity has not been verified by a reset
    NotInitialized,
    /// Timeout
    Timeout,
    /// Incomplete or corrupted RX frame
    IncompleteFrame,
    /// Every reinitialization attempt failed; the device is permanently failed
    ReinitializationExhausted,
}
