//! Host resource probes consulted by the batch loop.

use std::time::Instant;

/// Reports the process's current resident memory.
pub trait MemoryProbe: Send + Sync {
    /// Resident bytes, or `None` when the platform cannot tell.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Monotonic time source for the execution budget.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
