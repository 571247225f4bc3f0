//! Chip health supervision and counted reinitialization

/// Failed identity checks in a row that trigger a reinitialization
pub const MAX_FAILED_CHECKS: u8 = 3;

/// Reinitialization attempts before the device is declared failed
pub const MAX_REINIT_ATTEMPTS: u8 = 3;

/// Operational status of the device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Identity checks pass
    Healthy,
    /// At least one identity check failed
    Degraded,
    /// Recovering through reset and reconfiguration
    Reinitializing,
    /// Reinitialization budget exhausted; polling has stopped for good
    Failed,
}

/// Result of [`Supervisor::record_check`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check passed; `recovered` when earlier checks had failed
    Healthy {
        /// Health came back after failed checks
        recovered: bool,
    },
    /// The check failed; `first` on the first failure of a streak
    Degraded {
        /// First failure of the streak
        first: bool,
    },
    /// Too many failures in a row; reinitialize the chip now
    Reinitialize,
}

/// Result of [`Supervisor::finish_attempt`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The chip is back; counters were reset
    Recovered,
    /// Try again on the next update
    Retry,
    /// No attempts left; the device is failed
    Exhausted,
}

/// Health/recovery supervisor
///
/// Pure bookkeeping: the driver performs the identity checks and the reset sequence and reports
/// the results here.
#[derive(Clone, Debug)]
pub struct Supervisor {
    status: Status,
    failures: u8,
    attempts: u8,
    max_failed_checks: u8,
    max_reinit_attempts: u8,
    auto_reset: bool,
}

impl Default for Supervisor {
    fn default() -> Self {
        Supervisor::new(MAX_FAILED_CHECKS, MAX_REINIT_ATTEMPTS, true)
    }
}

impl Supervisor {
    /// Creates a healthy supervisor. Limits of 0 behave as 1.
    ///
    /// Without `auto_reset` failed checks only ever degrade the status.
    pub fn new(max_failed_checks: u8, max_reinit_attempts: u8, auto_reset: bool) -> Self {
        Supervisor {
            status: Status::Healthy,
            failures: 0,
            attempts: 0,
            max_failed_checks: max_failed_checks.max(1),
            max_reinit_attempts: max_reinit_attempts.max(1),
            auto_reset,
        }
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Is the device permanently failed?
    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    /// Is a reinitialization pending?
    pub fn is_reinitializing(&self) -> bool {
        self.status == Status::Reinitializing
    }

    /// Failed identity checks in a row
    pub fn consecutive_failures(&self) -> u8 {
        self.failures
    }

    /// Reinitialization attempts made in the current recovery
    pub fn reinit_attempts(&self) -> u8 {
        self.attempts
    }

    /// Records the result of an identity check
    pub fn record_check(&mut self, ok: bool) -> CheckOutcome {
        if ok {
            let recovered = self.failures > 0;
            self.failures = 0;
            self.status = Status::Healthy;

            return CheckOutcome::Healthy { recovered };
        }

        self.failures = self.failures.saturating_add(1);

        if self.auto_reset && self.failures >= self.max_failed_checks {
            self.status = Status::Reinitializing;
            CheckOutcome::Reinitialize
        } else {
            self.status = Status::Degraded;
            CheckOutcome::Degraded {
                first: self.failures == 1,
            }
        }
    }

    /// Counts a reinitialization attempt; returns its number, starting at 1
    pub fn begin_attempt(&mut self) -> u8 {
        self.status = Status::Reinitializing;
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Records the result of the attempt started by [`begin_attempt`](Supervisor::begin_attempt)
    pub fn finish_attempt(&mut self, ok: bool) -> AttemptOutcome {
        if ok {
            self.failures = 0;
            self.attempts = 0;
            self.status = Status::Healthy;

            AttemptOutcome::Recovered
        } else if self.attempts >= self.max_reinit_attempts {
            self.status = Status::Failed;

            AttemptOutcome::Exhausted
        } else {
            AttemptOutcome::Retry
        }
    }

    /// Marks the device failed without going through recovery (setup failure)
    pub fn fail(&mut self) {
        self.status = Status::Failed;
    }
}
