//! Debounced tag presence

use crate::anticollision::PollCycle;
use crate::uid::{Tag, Uid};

/// Consecutive missed cycles after which a present tag is reported removed
pub const REMOVAL_THRESHOLD: u8 = 3;

/// Presence edge produced by [`PresenceTracker::observe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A tag was sighted while none, or a different one, was present
    Appeared(Tag),
    /// The present tag missed enough consecutive cycles
    Removed(Uid),
}

/// Turns poll cycle outcomes into debounced appeared / removed edges
#[derive(Clone, Debug)]
pub struct PresenceTracker {
    uid: Option<Uid>,
    misses: u8,
    threshold: u8,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        PresenceTracker::new(REMOVAL_THRESHOLD)
    }
}

impl PresenceTracker {
    /// Creates a tracker with no tag present. A `threshold` of 0 behaves as 1.
    pub fn new(threshold: u8) -> Self {
        PresenceTracker {
            uid: None,
            misses: 0,
            threshold: threshold.max(1),
        }
    }

    /// Feeds the outcome of a finished cycle
    ///
    /// Only `Complete`, `NoTag` and `Timeout` affect presence; frame errors and in-flight
    /// outcomes leave it untouched.
    pub fn observe(&mut self, cycle: &PollCycle) -> Option<PresenceEvent> {
        match *cycle {
            PollCycle::Complete(tag) => {
                self.misses = 0;

                if self.uid == Some(tag.uid) {
                    return None;
                }

                self.uid = Some(tag.uid);
                Some(PresenceEvent::Appeared(tag))
            }
            PollCycle::NoTag | PollCycle::Timeout => {
                let uid = self.uid?;

                self.misses += 1;
                if self.misses < self.threshold {
                    trace!("{} missed {} cycle(s)", uid, self.misses);
                    return None;
                }

                self.uid = None;
                self.misses = 0;
                Some(PresenceEvent::Removed(uid))
            }
            PollCycle::FrameError
            | PollCycle::CollisionRetry
            | PollCycle::InProgress
            | PollCycle::Idle => None,
        }
    }

    /// UID of the present tag
    pub fn uid(&self) -> Option<&Uid> {
        self.uid.as_ref()
    }

    /// Is a tag present?
    pub fn is_present(&self) -> bool {
        self.uid.is_some()
    }

    /// Missed cycles since the present tag was last sighted
    pub fn consecutive_misses(&self) -> u8 {
        self.misses
    }
}

/// Tracks whether one expected UID is the one currently present
#[derive(Clone, Copy, Debug)]
pub struct UidWatch {
    expected: Uid,
    matched: Option<bool>,
}

impl UidWatch {
    /// Watches for `expected`
    pub fn new(expected: Uid) -> Self {
        UidWatch {
            expected,
            matched: None,
        }
    }

    /// The watched UID
    pub fn expected(&self) -> &Uid {
        &self.expected
    }

    /// Last published state; `None` before the first update
    pub fn is_matched(&self) -> Option<bool> {
        self.matched
    }

    /// Compares against the present UID; returns the new state only when it changed
    pub fn update(&mut self, present: Option<&Uid>) -> Option<bool> {
        let matched = present == Some(&self.expected);

        if self.matched == Some(matched) {
            None
        } else {
            self.matched = Some(matched);
            Some(matched)
        }
    }
}

/// Snapshot of the presence and health counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenceState {
    /// UID of the present tag
    pub uid: Option<Uid>,
    /// Missed cycles since the present tag was last sighted
    pub consecutive_misses: u8,
    /// Failed identity checks in a row
    pub consecutive_health_failures: u8,
    /// Reinitialization attempts since health was last good
    pub reinit_attempts: u8,
}
