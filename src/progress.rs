//! Progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Sink for detection progress.
///
/// Implementations must be safe to call from parallel workers; the engine
/// calls `increment` concurrently from rayon loops.
pub trait ProgressSink: Sync {
    /// Start a new phase with the given label, total step count, and the
    /// step the phase begins at.
    fn reset(&self, label: &str, total: u32, start: u32);

    /// One step of the current phase finished.
    fn increment(&self);
}

/// Progress sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn reset(&self, _label: &str, _total: u32, _start: u32) {}
    fn increment(&self) {}
}

/// Counting sink, handy for tests and simple callers.
#[derive(Debug, Default)]
pub struct CountingProgress {
    done: AtomicU32,
    total: AtomicU32,
}

impl CountingProgress {
    /// Create a fresh counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps completed in the current phase.
    #[must_use]
    pub fn done(&self) -> u32 {
        self.done.load(Ordering::Relaxed)
    }

    /// Total steps of the current phase.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total.load(Ordering::Relaxed)
    }
}

impl ProgressSink for CountingProgress {
    fn reset(&self, _label: &str, total: u32, start: u32) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(start, Ordering::Relaxed);
    }

    fn increment(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }
}

/// Clonable cooperative cancellation token.
///
/// The engine checks the token at the start of every layer iteration and
/// before expensive parallel blocks. Cancellation is not an error: a
/// cancelled detection returns the issues resolved so far.
///
/// # Example
///
/// ```
/// use slice_printability::CancelToken;
///
/// let token = CancelToken::new();
/// let worker = token.clone();
/// assert!(!worker.is_cancelled());
/// token.cancel();
/// assert!(worker.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Irreversible for this token family.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once any clone of the token was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_progress() {
        let progress = CountingProgress::new();
        progress.reset("phase", 10, 2);
        progress.increment();
        progress.increment();
        assert_eq!(progress.done(), 4);
        assert_eq!(progress.total(), 10);
    }

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }
}
