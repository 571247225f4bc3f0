//! Monotonic millisecond time source

/// Monotonic clock with millisecond resolution
///
/// Response windows are bounded by deadlines against this clock, sampled once per state machine
/// step.
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary, fixed origin
    fn now_ms(&self) -> u64;
}

impl<'a, C> Clock for &'a C
where
    C: Clock + ?Sized,
{
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// `std::time::Instant` based clock
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Starts counting from now
    pub fn new() -> Self {
        StdClock {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
