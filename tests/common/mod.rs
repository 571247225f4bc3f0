//! Simulated ST25R with a scripted PICC in its field
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal_mock::delay::MockNoop;
use st25r::interface::St25rInterface;
use st25r::{Chip, Clock, Config, Listener, PollCycle, St25r, Uid};

pub const OP_CONTROL: u8 = 0x02;
pub const MODE: u8 = 0x03;
pub const IRQ_MAIN: u8 = 0x18;
pub const IRQ_TIMER_NFC: u8 = 0x19;
pub const IRQ_ERROR_WUP: u8 = 0x1A;
pub const FIFO_STATUS1: u8 = 0x1B;
pub const FIFO_STATUS2: u8 = 0x1C;
pub const AD_CONVERTER: u8 = 0x21;
pub const TX_DRIVER: u8 = 0x28;
pub const IC_IDENTITY: u8 = 0x3F;

pub const SET_DEFAULT: u8 = 0xC1;
pub const CLEAR_FIFO: u8 = 0xC2;
pub const TRANSMIT_WITH_CRC: u8 = 0xC4;
pub const TRANSMIT_WITHOUT_CRC: u8 = 0xC5;
pub const MEASURE_AMPLITUDE: u8 = 0xD3;

// IRQ bits, per register
const RXE: u8 = 1 << 4;
const TXE: u8 = 1 << 3;
const COL: u8 = 1 << 2;
const NRE: u8 = 1 << 6;

pub const CT: u8 = 0x88;
pub const ST25R3916_IDENTITY: u8 = 0x2A;

/// PICC answering the reader
#[derive(Clone, Debug)]
pub struct ScriptedTag {
    /// UID CLn of each cascade level, cascade tags included
    pub levels: Vec<[u8; 4]>,
    /// Final SAK
    pub sak: u8,
    /// Anticollision responses to send with a wrong BCC
    pub corrupt_bcc: usize,
    /// Anticollision responses to garble with a collision
    pub collisions: usize,
    /// Answer SELECT commands
    pub answers_select: bool,
    /// Tag memory, 4 bytes per page
    pub memory: Vec<u8>,
}

impl ScriptedTag {
    pub fn new(uid: &[u8]) -> Self {
        let levels = match uid.len() {
            4 => vec![[uid[0], uid[1], uid[2], uid[3]]],
            7 => vec![[CT, uid[0], uid[1], uid[2]], [uid[3], uid[4], uid[5], uid[6]]],
            10 => vec![
                [CT, uid[0], uid[1], uid[2]],
                [CT, uid[3], uid[4], uid[5]],
                [uid[6], uid[7], uid[8], uid[9]],
            ],
            n => panic!("no such UID size: {}", n),
        };

        ScriptedTag {
            levels,
            sak: 0x00,
            corrupt_bcc: 0,
            collisions: 0,
            answers_select: true,
            memory: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct SimError;

pub struct SimState {
    pub regs: [u8; 64],
    /// Raw value of the identity register
    pub identity: u8,
    /// Identity reads that return 0x00 before `identity` comes back
    pub identity_glitches: usize,
    /// Bit rotation the silicon applies to every data byte it sends or receives
    pub shift: u8,
    pub amplitude: u8,
    pub tag: Option<ScriptedTag>,
    pub bus_error: bool,
    /// Every interface call, failed ones included
    pub ops: usize,
    pub commands: Vec<u8>,
    pub writes: Vec<(u8, u8)>,
    /// Frames put on air, unshifted
    pub frames: Vec<Vec<u8>>,
    fifo: VecDeque<u8>,
    loaded: Vec<u8>,
    irq: [u8; 3],
}

impl SimState {
    pub fn new(identity: u8) -> Self {
        SimState {
            regs: [0; 64],
            identity,
            identity_glitches: 0,
            shift: 0,
            amplitude: 0,
            tag: None,
            bus_error: false,
            ops: 0,
            commands: Vec::new(),
            writes: Vec::new(),
            frames: Vec::new(),
            fifo: VecDeque::new(),
            loaded: Vec::new(),
            irq: [0; 3],
        }
    }

    pub fn count_commands(&self, opcode: u8) -> usize {
        self.commands.iter().filter(|&&c| c == opcode).count()
    }

    fn touch(&mut self) -> Result<(), SimError> {
        self.ops += 1;
        if self.bus_error {
            Err(SimError)
        } else {
            Ok(())
        }
    }

    fn read(&mut self, addr: u8) -> u8 {
        let irq_index = match addr {
            IRQ_MAIN => Some(0),
            IRQ_TIMER_NFC => Some(1),
            IRQ_ERROR_WUP => Some(2),
            _ => None,
        };
        if let Some(i) = irq_index {
            let value = self.irq[i];
            self.irq[i] = 0;
            return value.rotate_left(self.shift.into());
        }

        match addr {
            FIFO_STATUS1 => (self.fifo.len() as u8).rotate_left(self.shift.into()),
            FIFO_STATUS2 => {
                (((self.fifo.len() >> 8) & 0x03) as u8).rotate_left(self.shift.into())
            }
            AD_CONVERTER => self.amplitude.rotate_left(self.shift.into()),
            IC_IDENTITY => {
                if self.identity_glitches > 0 {
                    self.identity_glitches -= 1;
                    0x00
                } else {
                    self.identity
                }
            }
            _ => self.regs[usize::from(addr)],
        }
    }

    fn command(&mut self, opcode: u8) {
        self.commands.push(opcode);

        match opcode {
            SET_DEFAULT => {
                self.regs = [0; 64];
                self.fifo.clear();
                self.loaded.clear();
                self.irq = [0; 3];
            }
            CLEAR_FIFO => {
                self.fifo.clear();
                self.loaded.clear();
            }
            TRANSMIT_WITH_CRC | TRANSMIT_WITHOUT_CRC => {
                let shift = u32::from(self.shift);
                let frame: Vec<u8> = self.loaded.iter().map(|b| b.rotate_right(shift)).collect();
                self.frames.push(frame.clone());
                self.irq[0] |= TXE;
                self.respond(&frame);
            }
            _ => {}
        }
    }

    fn respond(&mut self, frame: &[u8]) {
        let tag = match self.tag.as_mut() {
            Some(tag) => tag,
            None => {
                self.irq[1] |= NRE;
                return;
            }
        };

        let level = |sel: u8| match sel {
            0x93 => Some(0),
            0x95 => Some(1),
            0x97 => Some(2),
            _ => None,
        };

        let response: Option<Vec<u8>> = match frame {
            [0x52] | [0x26] => Some(vec![0x44, 0x00]),
            [sel, 0x20] => match level(*sel) {
                Some(i) if i < tag.levels.len() => {
                    let chunk = tag.levels[i];
                    let mut bcc = chunk.iter().fold(0, |acc, b| acc ^ b);
                    if tag.corrupt_bcc > 0 {
                        tag.corrupt_bcc -= 1;
                        bcc ^= 0xFF;
                    }
                    let mut response = chunk.to_vec();
                    response.push(bcc);
                    Some(response)
                }
                _ => None,
            },
            [sel, 0x70, ..] if tag.answers_select => level(*sel).map(|i| {
                if i + 1 < tag.levels.len() {
                    vec![0x04]
                } else {
                    vec![tag.sak]
                }
            }),
            [0x30, page] => {
                let start = usize::from(*page) * 4;
                Some(
                    (start..start + 16)
                        .map(|i| tag.memory.get(i).cloned().unwrap_or(0))
                        .collect(),
                )
            }
            _ => None,
        };

        let collide = match frame {
            [_, 0x20] if tag.collisions > 0 => {
                tag.collisions -= 1;
                true
            }
            _ => false,
        };

        match response {
            Some(response) if collide => {
                let shift = u32::from(self.shift);
                self.fifo.extend(response[..2].iter().map(|b| b.rotate_left(shift)));
                self.irq[0] |= COL;
            }
            Some(response) => {
                let shift = u32::from(self.shift);
                self.fifo.extend(response.iter().map(|b| b.rotate_left(shift)));
                self.irq[0] |= RXE;
            }
            None => self.irq[1] |= NRE,
        }
    }
}

/// Bus handle over the shared simulator state
pub struct SimBus(pub Rc<RefCell<SimState>>);

impl St25rInterface for SimBus {
    type Error = SimError;

    fn read_register(&mut self, addr: u8) -> Result<u8, SimError> {
        let mut sim = self.0.borrow_mut();
        sim.touch()?;
        Ok(sim.read(addr))
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        sim.touch()?;
        sim.writes.push((addr, value));
        sim.regs[usize::from(addr & 0x3F)] = value;
        Ok(())
    }

    fn send_command(&mut self, opcode: u8) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        sim.touch()?;
        sim.command(opcode);
        Ok(())
    }

    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        sim.touch()?;
        sim.loaded.extend_from_slice(bytes);
        Ok(())
    }

    fn read_fifo<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], SimError> {
        let mut sim = self.0.borrow_mut();
        sim.touch()?;
        for slot in buffer.iter_mut() {
            *slot = sim.fifo.pop_front().unwrap_or(0);
        }
        Ok(&*buffer)
    }
}

/// Clock advanced by hand
#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Appeared(Uid),
    Removed(Uid),
    Health(bool),
    UidMatch(Uid, bool),
    FieldStrength(u8),
    Content(Uid, Vec<u8>),
}

#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn appeared(&self) -> usize {
        self.count(|e| matches!(e, Event::Appeared(_)))
    }

    pub fn removed(&self) -> usize {
        self.count(|e| matches!(e, Event::Removed(_)))
    }

    fn count<F>(&self, f: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        self.events.iter().filter(|e| f(e)).count()
    }
}

impl Listener for Recorder {
    fn on_tag_appeared(&mut self, uid: &Uid) {
        self.events.push(Event::Appeared(*uid));
    }

    fn on_tag_removed(&mut self, uid: &Uid) {
        self.events.push(Event::Removed(*uid));
    }

    fn on_health_status_changed(&mut self, ok: bool) {
        self.events.push(Event::Health(ok));
    }

    fn on_uid_match(&mut self, expected: &Uid, matched: bool) {
        self.events.push(Event::UidMatch(*expected, matched));
    }

    fn on_field_strength(&mut self, amplitude: u8) {
        self.events.push(Event::FieldStrength(amplitude));
    }

    fn on_tag_content(&mut self, uid: &Uid, ndef: &[u8]) {
        self.events.push(Event::Content(*uid, ndef.to_vec()));
    }
}

pub type Driver = St25r<SimBus, MockNoop, ManualClock, Recorder>;

pub struct Bench {
    pub sim: Rc<RefCell<SimState>>,
    pub clock: ManualClock,
    pub driver: Driver,
}

impl Bench {
    /// Driver over a healthy ST25R3916, set up
    pub fn new(config: Config) -> Self {
        let mut bench = Bench::unset(SimState::new(ST25R3916_IDENTITY), config);
        bench.driver.setup().unwrap();
        bench
    }

    /// Driver that has not been set up yet
    pub fn unset(state: SimState, config: Config) -> Self {
        let sim = Rc::new(RefCell::new(state));
        let clock = ManualClock::default();
        let chip = Chip::new(SimBus(sim.clone()), MockNoop::new());
        let driver = St25r::new(chip, clock.clone(), Recorder::default(), config);

        Bench { sim, clock, driver }
    }

    pub fn place(&self, tag: ScriptedTag) {
        self.sim.borrow_mut().tag = Some(tag);
    }

    pub fn take_away(&self) {
        self.sim.borrow_mut().tag = None;
    }

    pub fn events(&self) -> &[Event] {
        &self.driver.listener().events
    }

    /// Runs one `update` and ticks, 1 ms apart, until the cycle finishes
    pub fn poll(&mut self) -> PollCycle {
        self.driver.update().unwrap();
        self.finish()
    }

    /// Ticks, 1 ms apart, until the cycle in flight finishes
    pub fn finish(&mut self) -> PollCycle {
        for _ in 0..1_000 {
            let cycle = self.driver.tick();
            if cycle.is_finished() || cycle == PollCycle::Idle {
                return cycle;
            }
            self.clock.advance(1);
        }

        panic!("poll cycle never finished")
    }
}

pub fn uid(bytes: &[u8]) -> Uid {
    Uid::from_bytes(bytes).unwrap()
}
