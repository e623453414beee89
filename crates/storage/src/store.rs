//! Reference-counted store handle
//!
//! The store owns a shard's on-disk index and is shared by every shard-level
//! component that touches it. Each user takes a reference (`inc_ref`) for as
//! long as it may open files and releases it (`dec_ref`) when done. The
//! creator's own reference is released by `close()`; once the count reaches
//! zero the store is closed for good and no new reference can be taken.
//!
//! # Corruption markers
//!
//! `mark_store_corrupted` leaves a `corrupted_<uuid>` file in the directory.
//! Allocation logic checks for the marker before reusing a shard copy, so it
//! has to be written before anyone learns that the engine failed.

use crate::directory::Directory;
use shadow_core::{IndexError, IndexResult, ShardId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Prefix of corruption marker files
pub const CORRUPTED_MARKER_PREFIX: &str = "corrupted_";

/// Reference-counted handle to a shard's index directory
pub struct Store {
    shard_id: ShardId,
    directory: Directory,
    /// Starts at 1 (the creator's reference)
    refs: AtomicUsize,
    /// Creator's reference released
    closed: AtomicBool,
}

impl Store {
    /// Create a store over `directory`, holding the creator's reference
    pub fn new(shard_id: ShardId, directory: Directory) -> Self {
        Store {
            shard_id,
            directory,
            refs: AtomicUsize::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Shard this store belongs to
    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Directory holding the index files
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Take a reference; fails once the store has been fully released
    pub fn inc_ref(&self) -> IndexResult<()> {
        if self.try_inc_ref() {
            Ok(())
        } else {
            Err(IndexError::AlreadyClosed(format!(
                "store {} is already closed, can't increment ref count",
                self.shard_id
            )))
        }
    }

    /// Take a reference if the store is still alive
    pub fn try_inc_ref(&self) -> bool {
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == 0 {
                    None
                } else {
                    Some(count + 1)
                }
            })
            .is_ok()
    }

    /// Release a reference
    ///
    /// Releasing more references than were taken is a caller bug; it is
    /// logged and the count stays at zero.
    pub fn dec_ref(&self) {
        let result = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        match result {
            Ok(1) => {
                debug!(target: "shadow::store", shard = %self.shard_id, "Store reference count reached 0, closing");
            }
            Ok(_) => {}
            Err(_) => {
                error!(target: "shadow::store", shard = %self.shard_id, "Store reference released more often than taken");
                debug_assert!(false, "store ref count underflow");
            }
        }
    }

    /// Current reference count
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Release the creator's reference; idempotent
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.dec_ref();
        }
    }

    /// True once every reference has been released
    pub fn is_closed(&self) -> bool {
        self.ref_count() == 0
    }

    /// Leave a corruption marker in the directory
    pub fn mark_store_corrupted(&self, cause: &IndexError) -> IndexResult<()> {
        if self.is_closed() {
            return Err(IndexError::AlreadyClosed(format!(
                "store {} is closed, can't mark it corrupted",
                self.shard_id
            )));
        }
        let name = format!("{}{}", CORRUPTED_MARKER_PREFIX, Uuid::new_v4().simple());
        let body = format!("{}\n{}", self.shard_id, cause);
        self.directory.write_atomic(&name, body.as_bytes())?;
        warn!(target: "shadow::store", shard = %self.shard_id, marker = %name, cause = %cause, "Marked store corrupted");
        Ok(())
    }

    /// True if a corruption marker exists
    pub fn is_marked_corrupted(&self) -> IndexResult<bool> {
        Ok(self
            .directory
            .list_all()?
            .iter()
            .any(|name| name.starts_with(CORRUPTED_MARKER_PREFIX)))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("shard_id", &self.shard_id)
            .field("refs", &self.ref_count())
            .finish()
    }
}
