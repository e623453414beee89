//! In-flight recovery tracking

use shadow_core::IndexResult;
use shadow_storage::Store;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::error;

/// Counts recovery sessions running against a store
///
/// Every session holds a store reference, so the store outlives it.
pub struct RecoveryCounter {
    store: Arc<Store>,
    ongoing: AtomicUsize,
}

impl RecoveryCounter {
    /// Counter for sessions against `store`
    pub fn new(store: Arc<Store>) -> Self {
        RecoveryCounter {
            store,
            ongoing: AtomicUsize::new(0),
        }
    }

    /// Begin a session; it ends when the guard is dropped
    pub fn start_recovery(&self) -> IndexResult<RecoveryGuard<'_>> {
        self.store.inc_ref()?;
        self.ongoing.fetch_add(1, Ordering::AcqRel);
        Ok(RecoveryGuard { counter: self })
    }

    /// Sessions in flight
    pub fn get(&self) -> usize {
        self.ongoing.load(Ordering::Acquire)
    }

    fn end_recovery(&self) {
        let ended = self
            .ongoing
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if ended.is_err() {
            error!(target: "shadow::engine", "Recovery ended more often than started");
            debug_assert!(false, "recovery counter underflow");
        }
        self.store.dec_ref();
    }
}

impl std::fmt::Debug for RecoveryCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCounter")
            .field("ongoing", &self.get())
            .finish()
    }
}

/// One in-flight recovery session
#[must_use = "the session ends as soon as the guard is dropped"]
pub struct RecoveryGuard<'a> {
    counter: &'a RecoveryCounter,
}

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.counter.end_recovery();
    }
}
