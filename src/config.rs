//! Driver configuration

use core::fmt;

use heapless::Vec;

use crate::anticollision::{WakeCommand, LEVEL_TIMEOUT_MS, WUPA_TIMEOUT_MS};
use crate::chip::MAX_RF_POWER;
use crate::health::{MAX_FAILED_CHECKS, MAX_REINIT_ATTEMPTS};
use crate::presence::REMOVAL_THRESHOLD;
use crate::uid::Uid;

/// Most UIDs that can be watched at once
pub const MAX_WATCHED_UIDS: usize = 8;

/// Driver configuration
///
/// `Config::default()` matches the reference behavior; adjust fields as needed and check them
/// with [`validate`](Config::validate).
#[derive(Clone, Debug)]
pub struct Config {
    /// RF power level, 0 (weakest) to 15 (strongest)
    pub rf_power: u8,
    /// Keep the RF field on between polls; when `false` the field is only on during a cycle
    pub field_enabled: bool,
    /// Interval between `update` calls made by `service`
    pub poll_interval_ms: u32,
    /// Frame used to wake PICCs
    pub wake_command: WakeCommand,
    /// Response window after the wake-up frame
    pub wupa_timeout_ms: u32,
    /// Response window of each cascade level
    pub level_timeout_ms: u32,
    /// Missed cycles before a present tag is reported removed
    pub removal_threshold: u8,
    /// Failed identity checks in a row before reinitializing
    pub max_failed_checks: u8,
    /// Reinitialization attempts before declaring the device failed
    pub max_reinit_attempts: u8,
    /// Reinitialize automatically after too many failed identity checks
    pub auto_reset: bool,
    /// Measure and report the field amplitude on every poll
    pub report_field_strength: bool,
    /// Read the NDEF message of Type 2 tags when they appear
    pub read_tag_content: bool,
    /// UIDs reported through `Listener::on_uid_match`
    pub watched_uids: Vec<Uid, MAX_WATCHED_UIDS>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rf_power: MAX_RF_POWER,
            field_enabled: true,
            poll_interval_ms: 1000,
            wake_command: WakeCommand::Wupa,
            wupa_timeout_ms: WUPA_TIMEOUT_MS,
            level_timeout_ms: LEVEL_TIMEOUT_MS,
            removal_threshold: REMOVAL_THRESHOLD,
            max_failed_checks: MAX_FAILED_CHECKS,
            max_reinit_attempts: MAX_REINIT_ATTEMPTS,
            auto_reset: true,
            report_field_strength: false,
            read_tag_content: false,
            watched_uids: Vec::new(),
        }
    }
}

impl Config {
    /// Adds a UID to watch
    pub fn watch_uid(&mut self, uid: Uid) -> Result<(), ConfigError> {
        self.watched_uids
            .push(uid)
            .map_err(|_| ConfigError::TooManyWatchedUids)
    }

    /// Checks ranges and thresholds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rf_power > MAX_RF_POWER {
            return Err(ConfigError::RfPowerOutOfRange(self.rf_power));
        }

        if self.removal_threshold == 0
            || self.max_failed_checks == 0
            || self.max_reinit_attempts == 0
            || self.wupa_timeout_ms == 0
            || self.level_timeout_ms == 0
        {
            return Err(ConfigError::ZeroThreshold);
        }

        Ok(())
    }
}

/// Invalid configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// RF power above 15
    RfPowerOutOfRange(u8),
    /// A threshold, attempt limit or timeout is zero
    ZeroThreshold,
    /// More than `MAX_WATCHED_UIDS` watched UIDs
    TooManyWatchedUids,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::RfPowerOutOfRange(power) => {
                write!(f, "RF power {} is out of range (0..=15)", power)
            }
            ConfigError::ZeroThreshold => f.write_str("thresholds and timeouts must be non-zero"),
            ConfigError::TooManyWatchedUids => {
                write!(f, "at most {} UIDs can be watched", MAX_WATCHED_UIDS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.rf_power, 15);
        assert_eq!(config.wupa_timeout_ms, 50);
        assert_eq!(config.level_timeout_ms, 100);
        assert_eq!(config.removal_threshold, 3);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.rf_power = 16;
        assert_eq!(config.validate(), Err(ConfigError::RfPowerOutOfRange(16)));

        let mut config = Config::default();
        config.removal_threshold = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroThreshold));
    }

    #[test]
    fn watched_uids_are_bounded() {
        let mut config = Config::default();
        let uid = Uid::from_bytes(&[1, 2, 3, 4]).unwrap();

        for _ in 0..MAX_WATCHED_UIDS {
            config.watch_uid(uid).unwrap();
        }
        assert_eq!(config.watch_uid(uid), Err(ConfigError::TooManyWatchedUids));
    }
}
