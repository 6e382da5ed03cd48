use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_FITTING: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a stage.
///
/// Producers key their per-follower demand tracking by this id. Ids grow
/// monotonically but carry no ordering meaning for the data itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FittingId(u64);

impl FittingId {
    /// Take the next id from the global counter
    pub fn next() -> Self {
        Self(NEXT_FITTING.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FittingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
