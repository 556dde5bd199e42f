use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic nanosecond time source.
///
/// The instance never reads the system clock directly; every timestamp it
/// stores or compares comes through one of these. Tests swap in a virtual
/// clock backed by an atomic counter.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> u64 + Send + Sync>);

impl Clock {
    /// Wall-clock-independent monotonic time, anchored at construction.
    pub fn monotonic() -> Self {
        let start = Instant::now();
        Self(Arc::new(move || start.elapsed().as_nanos() as u64))
    }

    pub fn from_fn(f: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn now_nanos(&self) -> u64 {
        (self.0)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::monotonic()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Clock(..)")
    }
}
