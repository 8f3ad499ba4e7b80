use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cancellation handle bound to one analysis session.
///
/// Every request draws a fresh id from a shared monotonic counter; a session
/// is cancelled the moment the counter moves past its id. There is no
/// explicit abort call — issuing a newer request (or loading a new file)
/// cancels everything older.
#[derive(Clone, Debug)]
pub struct CancelToken {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn new(id: u64, latest: Arc<AtomicU64>) -> Self {
        Self { id, latest }
    }

    /// A token that can never be cancelled. Used for synchronous builds and
    /// in tests.
    pub fn detached() -> Self {
        let latest = Arc::new(AtomicU64::new(0));
        Self { id: 0, latest }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.latest.load(Ordering::Relaxed) != self.id
    }
}
