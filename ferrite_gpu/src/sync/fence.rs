/// Fence wait primitives

use std::time::Duration;

/// How long a blocking fence wait may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Wait until the fence signals, however long that takes
    Indefinite,
    /// Give up after this many nanoseconds
    Nanos(u64),
}

impl Timeout {
    pub fn from_duration(duration: Duration) -> Self {
        Timeout::Nanos(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Nanosecond value as expected by explicit graphics APIs
    /// (`u64::MAX` is the indefinite sentinel)
    pub fn as_nanos(self) -> u64 {
        match self {
            Timeout::Indefinite => u64::MAX,
            Timeout::Nanos(n) => n,
        }
    }
}

/// Outcome of a fence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    TimedOut,
}
