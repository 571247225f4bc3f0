//! Interrupt request flag

use core::sync::atomic::{AtomicBool, Ordering};

/// Latch set from the IRQ pin interrupt handler and consumed by [`St25r::tick`]
///
/// This is the only state shared across the interrupt boundary.
///
/// ```
/// use st25r::IrqFlag;
///
/// static IRQ: IrqFlag = IrqFlag::new();
///
/// // in the GPIO interrupt handler
/// IRQ.signal();
///
/// assert!(IRQ.take());
/// assert!(!IRQ.take());
/// ```
///
/// [`St25r::tick`]: crate::St25r::tick
#[derive(Debug, Default)]
pub struct IrqFlag {
    raised: AtomicBool,
}

impl IrqFlag {
    /// Creates a lowered flag
    pub const fn new() -> Self {
        IrqFlag {
            raised: AtomicBool::new(false),
        }
    }

    /// Raises the flag. Call this from the interrupt handler.
    pub fn signal(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Lowers the flag, returning whether it was raised
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    /// Returns whether the flag is raised without lowering it
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}
