//! ISO14443A tag acquisition: wake-up, cascade-level anticollision and select
//!
//! The engine never blocks. [`Anticollision::start`] puts the wake-up frame on air and every
//! subsequent [`Anticollision::step`] looks at the chip at most once, compares the clock sample
//! against the current response window and moves the cycle forward.
//!
//! Collisions are not resolved at the bit level: a colliding or truncated anticollision response
//! is answered by sending the same cascade level again until the level's response window closes.

use generic_array::typenum::U5;
use hal::blocking::delay::DelayMs;

use crate::chip::{Chip, Framing};
use crate::interface::St25rInterface;
use crate::picc;
use crate::register::Irq;
use crate::uid::{Tag, Uid};

/// Response window after the wake-up frame
pub const WUPA_TIMEOUT_MS: u32 = 50;

/// Response window of each cascade level
pub const LEVEL_TIMEOUT_MS: u32 = 100;

const ATQA_LEN: usize = 2;

/// Frame used to wake PICCs up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeCommand {
    /// WUPA: wakes idle and halted PICCs
    Wupa,
    /// REQA: wakes idle PICCs only
    Reqa,
}

impl WakeCommand {
    fn opcode(self) -> u8 {
        match self {
            WakeCommand::Wupa => picc::WUPA,
            WakeCommand::Reqa => picc::REQA,
        }
    }
}

impl Default for WakeCommand {
    fn default() -> Self {
        WakeCommand::Wupa
    }
}

/// Cascade level of the anticollision loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CascadeLevel {
    /// Level 1, SEL = 0x93
    One,
    /// Level 2, SEL = 0x95
    Two,
    /// Level 3, SEL = 0x97
    Three,
}

impl CascadeLevel {
    /// SEL byte of this level
    pub fn sel(self) -> u8 {
        match self {
            CascadeLevel::One => picc::SEL_CL1,
            CascadeLevel::Two => picc::SEL_CL2,
            CascadeLevel::Three => picc::SEL_CL3,
        }
    }

    /// The level that follows a cascade tag, if any
    pub fn next(self) -> Option<Self> {
        match self {
            CascadeLevel::One => Some(CascadeLevel::Two),
            CascadeLevel::Two => Some(CascadeLevel::Three),
            CascadeLevel::Three => None,
        }
    }
}

/// What the interrupt line says about this step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqSignal {
    /// No interrupt line; the status registers are polled every step
    NotWired,
    /// The line fired since the last step
    Raised,
    /// The line is wired and stayed quiet
    Quiet,
}

/// Outcome of one engine step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollCycle {
    /// No acquisition in progress
    Idle,
    /// Waiting for a response; part of the UID may already be known
    InProgress,
    /// All cascade levels resolved and the PICC selected
    Complete(Tag),
    /// A collision or truncated response; the current level was sent again
    CollisionRetry,
    /// A cascade level went unanswered; the partial UID was discarded
    Timeout,
    /// Nothing answered the wake-up frame
    NoTag,
    /// BCC mismatch or an impossible cascade; the cycle was abandoned
    FrameError,
}

impl PollCycle {
    /// Has the cycle ended, successfully or not?
    pub fn is_finished(&self) -> bool {
        match *self {
            PollCycle::Complete(_) | PollCycle::Timeout | PollCycle::NoTag | PollCycle::FrameError => {
                true
            }
            PollCycle::Idle | PollCycle::InProgress | PollCycle::CollisionRetry => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    // SEL + NVB 0x20 sent, waiting for UID CLn + BCC
    Anticollision,
    // SELECT sent, waiting for SAK; `cascade` when the UID chunk started with CT
    Select { cascade: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    WupaSent {
        deadline: u64,
    },
    ReadUid {
        level: CascadeLevel,
        phase: Phase,
        deadline: u64,
    },
}

/// Anticollision state machine
///
/// One instance per chip; only one acquisition is ever in flight.
#[derive(Debug)]
pub struct Anticollision {
    state: State,
    uid: Uid,
    atqa: [u8; ATQA_LEN],
    wake: WakeCommand,
    wupa_timeout_ms: u32,
    level_timeout_ms: u32,
}

impl Default for Anticollision {
    fn default() -> Self {
        Anticollision::new(WakeCommand::Wupa, WUPA_TIMEOUT_MS, LEVEL_TIMEOUT_MS)
    }
}

impl Anticollision {
    /// Creates an idle engine
    ///
    /// Response windows shorter than 1 ms are raised to 1 ms.
    pub fn new(wake: WakeCommand, wupa_timeout_ms: u32, level_timeout_ms: u32) -> Self {
        Anticollision {
            state: State::Idle,
            uid: Uid::empty(),
            atqa: [0; ATQA_LEN],
            wake,
            wupa_timeout_ms: wupa_timeout_ms.max(1),
            level_timeout_ms: level_timeout_ms.max(1),
        }
    }

    /// Is an acquisition in flight?
    pub fn is_active(&self) -> bool {
        self.state != State::Idle
    }

    /// UID bytes resolved so far in the current cycle
    pub fn partial_uid(&self) -> &Uid {
        &self.uid
    }

    /// Cascade level being resolved, if any
    pub fn level(&self) -> Option<CascadeLevel> {
        match self.state {
            State::ReadUid { level, .. } => Some(level),
            State::Idle | State::WupaSent { .. } => None,
        }
    }

    /// Abandons the current cycle, discarding partial results
    pub fn abort(&mut self) {
        self.state = State::Idle;
        self.uid.clear();
    }

    /// Clears FIFO and interrupts and sends the wake-up frame
    pub fn start<IF, D>(&mut self, chip: &mut Chip<IF, D>, now: u64) -> Result<(), IF::Error>
    where
        IF: St25rInterface,
        D: DelayMs<u32>,
    {
        self.abort();
        chip.transmit(&[self.wake.opcode()], Framing::Short)?;

        trace!("{:?} sent", self.wake);
        self.state = State::WupaSent {
            deadline: now + u64::from(self.wupa_timeout_ms),
        };

        Ok(())
    }

    /// Advances the cycle
    ///
    /// `now` is the clock sample of this step. With `IrqSignal::Quiet` no register is touched
    /// unless the response window has closed.
    pub fn step<IF, D>(
        &mut self,
        chip: &mut Chip<IF, D>,
        now: u64,
        signal: IrqSignal,
    ) -> Result<PollCycle, IF::Error>
    where
        IF: St25rInterface,
        D: DelayMs<u32>,
    {
        match self.state {
            State::Idle => Ok(PollCycle::Idle),
            State::WupaSent { deadline } => {
                if now >= deadline {
                    return Ok(self.finish(PollCycle::NoTag));
                }
                if signal == IrqSignal::Quiet {
                    return Ok(PollCycle::InProgress);
                }

                self.wait_atqa(chip, now)
            }
            State::ReadUid {
                level,
                phase,
                deadline,
            } => {
                if now >= deadline {
                    debug!("cascade level {:?} timed out", level);
                    return Ok(self.finish(PollCycle::Timeout));
                }
                if signal == IrqSignal::Quiet {
                    return Ok(PollCycle::InProgress);
                }

                match phase {
                    Phase::Anticollision => self.read_level(chip, level, now),
                    Phase::Select { cascade } => self.read_sak(chip, level, cascade, now),
                }
            }
        }
    }

    fn wait_atqa<IF, D>(&mut self, chip: &mut Chip<IF, D>, now: u64) -> Result<PollCycle, IF::Error>
    where
        IF: St25rInterface,
        D: DelayMs<u32>,
    {
        let irq = chip.read_irqs()?;
        let available = chip.fifo_len()?;

        if available == 0 {
            if irq.contains(Irq::NRE) {
                return Ok(self.finish(PollCycle::NoTag));
            }
            return Ok(PollCycle::InProgress);
        }

        let mut atqa = [0; ATQA_LEN];
        let n = available.min(ATQA_LEN);
        chip.read_fifo(&mut atqa[..n])?;
        self.atqa = atqa;
        trace!("ATQA {:02x?}", atqa);

        self.send_level(chip, CascadeLevel::One, now)?;
        Ok(PollCycle::InProgress)
    }

    fn read_level<IF, D>(
        &mut self,
        chip: &mut Chip<IF, D>,
        level: CascadeLevel,
        now: u64,
    ) -> Result<PollCycle, IF::Error>
    where
        IF: St25rInterface,
        D: DelayMs<u32>,
    {
        let irq = chip.read_irqs()?;

        if irq.collision() {
            return self.retry_level(chip, level);
        }

        let available = chip.fifo_len()?;
        if available < 5 {
            if irq.frame_ended() {
                return self.retry_level(chip, level);
            }
            return Ok(PollCycle::InProgress);
        }

        let frame = chip.read_frame::<U5>()?;
        let chunk = [frame[0], frame[1], frame[2], frame[3]];

        if picc::bcc(&chunk) != frame[4] {
            warn!("BCC mismatch at cascade level {:?}", level);
            return Ok(self.finish(PollCycle::FrameError));
        }

        let cascade = self.uid.push_level(&chunk);
        if cascade && level.next().is_none() {
            warn!("cascade tag at the last cascade level");
            return Ok(self.finish(PollCycle::FrameError));
        }

        let select = [
            level.sel(),
            picc::NVB_SELECT,
            frame[0],
            frame[1],
            frame[2],
            frame[3],
            frame[4],
        ];
        chip.transmit(&select, Framing::WithCrc)?;

        self.state = State::ReadUid {
            level,
            phase: Phase::Select { cascade },
            deadline: now + u64::from(self.level_timeout_ms),
        };
        Ok(PollCycle::InProgress)
    }

    fn read_sak<IF, D>(
        &mut self,
        chip: &mut Chip<IF, D>,
        level: CascadeLevel,
        cascade: bool,
        now: u64,
    ) -> Result<PollCycle, IF::Error>
    where
        IF: St25rInterface,
        D: DelayMs<u32>,
    {
        let irq = chip.read_irqs()?;

        if irq.contains(Irq::ERRORS) {
            warn!("corrupted SAK at cascade level {:?}", level);
            return Ok(self.finish(PollCycle::FrameError));
        }

        if chip.fifo_len()? == 0 {
            if irq.contains(Irq::NRE) {
                return Ok(self.finish(PollCycle::Timeout));
            }
            return Ok(PollCycle::InProgress);
        }

        let mut sak = [0];
        chip.read_fifo(&mut sak)?;
        let sak = sak[0];

        match (cascade, level.next()) {
            (true, Some(next)) => {
                trace!("SAK {:#04x}, continuing with {:?}", sak, next);
                self.send_level(chip, next, now)?;
                Ok(PollCycle::InProgress)
            }
            (true, None) => Ok(self.finish(PollCycle::FrameError)),
            (false, _) => {
                let tag = Tag {
                    uid: self.uid,
                    atqa: self.atqa,
                    sak,
                };
                debug!("selected {} (SAK {:#04x})", tag.uid, sak);
                Ok(self.finish(PollCycle::Complete(tag)))
            }
        }
    }

    fn send_level<IF, D>(
        &mut self,
        chip: &mut Chip<IF, D>,
        level: CascadeLevel,
        now: u64,
    ) -> Result<(), IF::Error>
    where
        IF: St25rInterface,
        D: DelayMs<u32>,
    {
        chip.transmit(&[level.sel(), picc::NVB_ANTICOLLISION], Framing::Plain)?;

        self.state = State::ReadUid {
            level,
            phase: Phase::Anticollision,
            deadline: now + u64::from(self.level_timeout_ms),
        };
        Ok(())
    }

    // the response window of the level is kept
    fn retry_level<IF, D>(
        &mut self,
        chip: &mut Chip<IF, D>,
        level: CascadeLevel,
    ) -> Result<PollCycle, IF::Error>
    where
        IF: St25rInterface,
        D: DelayMs<u32>,
    {
        trace!("retrying cascade level {:?}", level);
        chip.transmit(&[level.sel(), picc::NVB_ANTICOLLISION], Framing::Plain)?;

        Ok(PollCycle::CollisionRetry)
    }

    fn finish(&mut self, outcome: PollCycle) -> PollCycle {
        self.abort();
        outcome
    }
}
