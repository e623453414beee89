//! Commit-point snapshots
//!
//! A snapshot pins one commit point so the files it references survive
//! later commits until the snapshot is released. Recovery hands a snapshot
//! to the recovery target; external callers take one to copy the index.
//!
//! # Design Notes
//!
//! - **Shared**: the policy is cloned into the writer and the engine; all
//!   clones see the same pin counts
//! - **RAII**: dropping a `SnapshotIndexCommit` releases its pin
//! - **Serialized with pruning**: a snapshot reads and pins the latest commit
//!   under the same lock the writer holds while pruning, so a commit is
//!   either pinned before the writer looks or already gone when read

use crate::commit::IndexCommit;
use crate::directory::Directory;
use parking_lot::{Mutex, MutexGuard};
use shadow_core::IndexResult;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tracing::trace;

/// Tracks which commit points are pinned by live snapshots
#[derive(Clone, Default)]
pub struct SnapshotDeletionPolicy {
    pins: Arc<Mutex<HashMap<u64, usize>>>,
}

impl SnapshotDeletionPolicy {
    /// New policy with no snapshots
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the latest commit in `directory`
    pub fn snapshot(&self, directory: &Directory) -> IndexResult<SnapshotIndexCommit> {
        let mut pins = self.pins.lock();
        let commit = IndexCommit::read_latest(directory)?;
        let generation = commit.generation();
        *pins.entry(generation).or_insert(0) += 1;
        drop(pins);
        trace!(target: "shadow::index", generation, "Snapshotted commit");
        Ok(SnapshotIndexCommit {
            commit,
            pins: Some(Arc::clone(&self.pins)),
        })
    }

    /// True if a live snapshot pins `generation`
    pub fn is_snapshotted(&self, generation: u64) -> bool {
        self.pins.lock().contains_key(&generation)
    }

    /// Pinned generations, locked against new snapshots while held
    pub(crate) fn lock_pins(&self) -> MutexGuard<'_, HashMap<u64, usize>> {
        self.pins.lock()
    }

    /// Number of live snapshots across all generations
    pub fn snapshot_count(&self) -> usize {
        self.pins.lock().values().sum()
    }
}

impl std::fmt::Debug for SnapshotDeletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotDeletionPolicy")
            .field("pins", &*self.pins.lock())
            .finish()
    }
}

/// A pinned commit point; released on drop
#[derive(Debug)]
pub struct SnapshotIndexCommit {
    commit: IndexCommit,
    pins: Option<Arc<Mutex<HashMap<u64, usize>>>>,
}

impl SnapshotIndexCommit {
    /// The pinned commit
    pub fn commit(&self) -> &IndexCommit {
        &self.commit
    }

    /// Release the pin now; idempotent
    pub fn release(&mut self) {
        let Some(pins) = self.pins.take() else {
            return;
        };
        let generation = self.commit.generation();
        let mut pins = pins.lock();
        if let Some(count) = pins.get_mut(&generation) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&generation);
            }
        }
        trace!(target: "shadow::index", generation, "Released commit snapshot");
    }
}

impl Deref for SnapshotIndexCommit {
    type Target = IndexCommit;

    fn deref(&self) -> &IndexCommit {
        &self.commit
    }
}

impl Drop for SnapshotIndexCommit {
    fn drop(&mut self) {
        self.release();
    }
}
