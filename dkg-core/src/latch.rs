//! Process-wide exclusion of expensive protocol executions.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lets only one protocol execution run at a time within a process.
///
/// Cloning gives another handle to the same latch.
#[derive(Clone, Debug, Default)]
pub struct ProtocolLatch {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    lock: Arc<Mutex<()>>,
    executing: AtomicBool,
}

impl ProtocolLatch {
    /// Create an unlocked latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other protocol executes and take the latch. It is
    /// released when the returned guard is dropped.
    pub async fn lock(&self) -> ProtocolGuard {
        let guard = self.inner.lock.clone().lock_owned().await;
        self.inner.executing.store(true, Ordering::SeqCst);
        ProtocolGuard {
            inner: self.inner.clone(),
            _guard: guard,
        }
    }

    /// Whether a protocol currently holds the latch.
    pub fn is_executing(&self) -> bool {
        self.inner.executing.load(Ordering::SeqCst)
    }
}

/// Holds a [`ProtocolLatch`] until dropped.
#[derive(Debug)]
pub struct ProtocolGuard {
    inner: Arc<Inner>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ProtocolGuard {
    fn drop(&mut self) {
        // Runs before `_guard` releases the mutex, so the next holder's store
        // cannot be overwritten.
        self.inner.executing.store(false, Ordering::SeqCst);
    }
}
