//! Polling driver

use core::convert::Infallible;
use core::fmt;

use hal::blocking::delay::DelayMs;
use hal::digital::v2::OutputPin;
use heapless::Vec;

use crate::anticollision::{Anticollision, IrqSignal, PollCycle};
use crate::chip::{Chip, Variant};
use crate::clock::Clock;
use crate::config::{Config, MAX_WATCHED_UIDS};
use crate::health::{AttemptOutcome, CheckOutcome, Status, Supervisor};
use crate::interface::St25rInterface;
use crate::irq::IrqFlag;
use crate::listener::Listener;
use crate::presence::{PresenceEvent, PresenceState, PresenceTracker, UidWatch};
use crate::type2::{ChipLink, TagContentReader, Type2Reader};
use crate::uid::{Tag, Uid};
use crate::Error;

const RESET_PULSE_MS: u32 = 10;

/// Placeholder for an absent reset line
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPin;

impl OutputPin for NoPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// ST25R tag reader
///
/// Call [`update`](St25r::update) at the poll interval and [`tick`](St25r::tick) as often as
/// possible, from the same thread; or call [`service`](St25r::service) in a loop and let it do
/// both.
pub struct St25r<IF, D, CLK, L, RST = NoPin> {
    chip: Chip<IF, D>,
    clock: CLK,
    listener: L,
    config: Config,
    reset_pin: Option<RST>,
    irq: Option<&'static IrqFlag>,
    engine: Anticollision,
    tracker: PresenceTracker,
    supervisor: Supervisor,
    watches: Vec<UidWatch, MAX_WATCHED_UIDS>,
    reader: Type2Reader,
    last_update: Option<u64>,
}

impl<IF, D, CLK, L> St25r<IF, D, CLK, L, NoPin> {
    /// Creates a driver. Nothing is sent to the chip until [`setup`](St25r::setup).
    ///
    /// Out of range values in `config` are clamped: zero thresholds, attempt limits and response
    /// windows become 1 and the RF power is capped at 15. [`Config::validate`] reports them
    /// instead.
    pub fn new(chip: Chip<IF, D>, clock: CLK, listener: L, config: Config) -> Self {
        let engine = Anticollision::new(
            config.wake_command,
            config.wupa_timeout_ms,
            config.level_timeout_ms,
        );
        let tracker = PresenceTracker::new(config.removal_threshold);
        let supervisor = Supervisor::new(
            config.max_failed_checks,
            config.max_reinit_attempts,
            config.auto_reset,
        );
        let watches = config.watched_uids.iter().map(|uid| UidWatch::new(*uid)).collect();

        St25r {
            chip,
            clock,
            listener,
            config,
            reset_pin: None,
            irq: None,
            engine,
            tracker,
            supervisor,
            watches,
            reader: Type2Reader,
            last_update: None,
        }
    }

    /// Uses `pin` to hardware reset the chip during setup and reinitialization
    pub fn with_reset_pin<RST>(self, pin: RST) -> St25r<IF, D, CLK, L, RST>
    where
        RST: OutputPin,
    {
        St25r {
            chip: self.chip,
            clock: self.clock,
            listener: self.listener,
            config: self.config,
            reset_pin: Some(pin),
            irq: self.irq,
            engine: self.engine,
            tracker: self.tracker,
            supervisor: self.supervisor,
            watches: self.watches,
            reader: self.reader,
            last_update: self.last_update,
        }
    }
}

impl<IF, D, CLK, L, RST> St25r<IF, D, CLK, L, RST> {
    /// Waits for `flag` between engine steps instead of polling the status registers
    pub fn with_irq(mut self, flag: &'static IrqFlag) -> Self {
        self.irq = Some(flag);
        self
    }

    /// Operational status
    pub fn status(&self) -> Status {
        self.supervisor.status()
    }

    /// UID of the present tag
    pub fn current_uid(&self) -> Option<&Uid> {
        self.tracker.uid()
    }

    /// Is a tag present?
    pub fn is_tag_present(&self) -> bool {
        self.tracker.is_present()
    }

    /// Snapshot of the presence and health counters
    pub fn presence(&self) -> PresenceState {
        PresenceState {
            uid: self.tracker.uid().copied(),
            consecutive_misses: self.tracker.consecutive_misses(),
            consecutive_health_failures: self.supervisor.consecutive_failures(),
            reinit_attempts: self.supervisor.reinit_attempts(),
        }
    }

    /// The chip session
    pub fn chip(&self) -> &Chip<IF, D> {
        &self.chip
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The listener
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Mutable access to the listener
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Releases the chip session, clock, listener and reset pin
    pub fn release(self) -> (Chip<IF, D>, CLK, L, Option<RST>) {
        (self.chip, self.clock, self.listener, self.reset_pin)
    }
}

impl<E, IF, D, CLK, L, RST> St25r<IF, D, CLK, L, RST>
where
    IF: St25rInterface<Error = E>,
    D: DelayMs<u32>,
    CLK: Clock,
    L: Listener,
    RST: OutputPin,
    E: fmt::Debug,
{
    /// Resets, identifies and configures the chip
    ///
    /// An unknown identity is fatal: the status becomes [`Status::Failed`] and the driver stays
    /// silent from then on.
    pub fn setup(&mut self) -> Result<(), Error<E>> {
        info!("setting up ST25R");

        self.pulse_reset();
        let variant = match self.restart() {
            Ok(variant) => variant,
            Err(e) => {
                error!("setup failed: {:?}", e);
                self.supervisor.fail();
                return Err(e);
            }
        };

        self.dump_config(variant);
        self.listener.on_health_status_changed(true);
        self.publish_watches();

        Ok(())
    }

    /// Periodic work: health check, then a new acquisition cycle
    ///
    /// Returns `Err(Error::ReinitializationExhausted)` once, when the last reinitialization
    /// attempt fails. Does nothing while a cycle is in flight or after the device failed.
    pub fn update(&mut self) -> Result<(), Error<E>> {
        match self.supervisor.status() {
            Status::Failed => return Ok(()),
            Status::Reinitializing => return self.reinitialize(),
            Status::Healthy | Status::Degraded => {}
        }

        if self.engine.is_active() {
            return Ok(());
        }

        let ok = match self.chip.verify_identity() {
            Ok(ok) => ok,
            Err(e) => {
                warn!("identity check: {:?}", e);
                false
            }
        };

        match self.supervisor.record_check(ok) {
            CheckOutcome::Healthy { recovered } => {
                if recovered {
                    info!("identity check passes again");
                    self.listener.on_health_status_changed(true);
                }
            }
            CheckOutcome::Degraded { first } => {
                warn!(
                    "identity check failed ({} in a row)",
                    self.supervisor.consecutive_failures()
                );
                if first {
                    self.listener.on_health_status_changed(false);
                }
                return Ok(());
            }
            CheckOutcome::Reinitialize => {
                warn!(
                    "identity check failed {} times in a row, reinitializing",
                    self.supervisor.consecutive_failures()
                );
                return self.reinitialize();
            }
        }

        if self.config.report_field_strength {
            match self.chip.measure_amplitude() {
                Ok(amplitude) => self.listener.on_field_strength(amplitude),
                Err(e) => warn!("field strength: {:?}", e),
            }
        }

        if !self.config.field_enabled {
            if let Err(e) = self.chip.field_on() {
                warn!("field on: {:?}", e);
                return Ok(());
            }
        }

        let now = self.clock.now_ms();
        if let Err(e) = self.engine.start(&mut self.chip, now) {
            warn!("could not start a poll cycle: {:?}", e);
            self.engine.abort();
            self.cycle_field_off();
        }

        Ok(())
    }

    /// Fast work: advances the acquisition cycle in flight
    ///
    /// Bus errors abandon the cycle, which then counts as `NoTag`.
    pub fn tick(&mut self) -> PollCycle {
        if self.supervisor.is_failed() || !self.engine.is_active() {
            return PollCycle::Idle;
        }

        let now = self.clock.now_ms();
        let signal = match self.irq {
            Some(flag) if flag.take() => IrqSignal::Raised,
            Some(_) => IrqSignal::Quiet,
            None => IrqSignal::NotWired,
        };

        let cycle = match self.engine.step(&mut self.chip, now, signal) {
            Ok(cycle) => cycle,
            Err(e) => {
                warn!("bus error during acquisition: {:?}", e);
                self.engine.abort();
                PollCycle::NoTag
            }
        };

        if cycle.is_finished() {
            self.finish_cycle(&cycle);
        }

        cycle
    }

    /// Calls [`update`](St25r::update) every `poll_interval_ms` and [`tick`](St25r::tick) on
    /// every call
    pub fn service(&mut self) -> Result<PollCycle, Error<E>> {
        let now = self.clock.now_ms();
        let due = match self.last_update {
            Some(last) => now.saturating_sub(last) >= u64::from(self.config.poll_interval_ms),
            None => true,
        };

        if due {
            self.last_update = Some(now);
            self.update()?;
        }

        Ok(self.tick())
    }

    fn finish_cycle(&mut self, cycle: &PollCycle) {
        let event = self.tracker.observe(cycle);

        match event {
            Some(PresenceEvent::Appeared(tag)) => {
                info!("tag {} appeared", tag.uid);
                self.listener.on_tag_appeared(&tag.uid);

                if self.config.read_tag_content && tag.is_type2() {
                    self.read_content(&tag);
                }
            }
            Some(PresenceEvent::Removed(uid)) => {
                info!("tag {} removed", uid);
                self.listener.on_tag_removed(&uid);
            }
            None => {}
        }

        if event.is_some() {
            self.publish_watches();
        }

        self.cycle_field_off();
    }

    fn read_content(&mut self, tag: &Tag) {
        let mut link = ChipLink::new(&mut self.chip, &self.clock);

        match self.reader.read_content(&tag.uid, &mut link) {
            Ok(Some(message)) => self.listener.on_tag_content(&tag.uid, &message),
            Ok(None) => debug!("{} holds no NDEF message", tag.uid),
            Err(e) => warn!("reading {}: {}", tag.uid, e),
        }
    }

    fn publish_watches(&mut self) {
        let present = self.tracker.uid().copied();

        for watch in self.watches.iter_mut() {
            if let Some(matched) = watch.update(present.as_ref()) {
                self.listener.on_uid_match(watch.expected(), matched);
            }
        }
    }

    fn reinitialize(&mut self) -> Result<(), Error<E>> {
        let attempt = self.supervisor.begin_attempt();
        info!(
            "reinitialization attempt {}/{}",
            attempt, self.config.max_reinit_attempts
        );

        self.engine.abort();
        self.pulse_reset();
        let ok = match self.restart() {
            Ok(_) => true,
            Err(e) => {
                warn!("reinitialization failed: {:?}", e);
                false
            }
        };

        match self.supervisor.finish_attempt(ok) {
            AttemptOutcome::Recovered => {
                info!("chip recovered");
                self.listener.on_health_status_changed(true);
                Ok(())
            }
            AttemptOutcome::Retry => Ok(()),
            AttemptOutcome::Exhausted => {
                error!("giving up after {} reinitialization attempts", attempt);
                Err(Error::ReinitializationExhausted)
            }
        }
    }

    // reset + configure + field restore
    fn restart(&mut self) -> Result<Variant, Error<E>> {
        let variant = self.chip.reset()?;
        self.chip.configure()?;
        self.chip.set_rf_power(self.config.rf_power)?;

        if self.config.field_enabled {
            self.chip.field_on()?;
        }

        Ok(variant)
    }

    fn pulse_reset(&mut self) {
        let pin = match self.reset_pin.as_mut() {
            Some(pin) => pin,
            None => return,
        };

        if pin.set_low().is_err() {
            warn!("could not drive the reset pin low");
        }
        self.chip.delay_ms(RESET_PULSE_MS);

        if pin.set_high().is_err() {
            warn!("could not drive the reset pin high");
        }
        self.chip.delay_ms(RESET_PULSE_MS);
    }

    fn cycle_field_off(&mut self) {
        if self.config.field_enabled {
            return;
        }

        if let Err(e) = self.chip.field_off() {
            warn!("field off: {:?}", e);
        }
    }

    fn dump_config(&self, variant: Variant) {
        info!("ST25R: {:?}", variant);
        info!("  bit shift: {}", self.chip.shift());
        info!("  RF power: {}", self.chip.rf_power());
        info!("  field always on: {}", self.config.field_enabled);
        info!("  poll interval: {} ms", self.config.poll_interval_ms);
        info!("  wake-up: {:?}", self.config.wake_command);
        info!(
            "  IRQ: {}",
            if self.irq.is_some() { "wired" } else { "polled" }
        );
        info!("  reset pin: {}", self.reset_pin.is_some());
        info!("  auto reset: {}", self.config.auto_reset);
        for uid in self.config.watched_uids.iter() {
            info!("  watching {}", uid);
        }
    }
}
