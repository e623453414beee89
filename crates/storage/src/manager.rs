//! Read-view management
//!
//! - `ViewManager`: hands out the current read view to concurrent readers,
//!   takes it back, and swaps in a newer view on refresh
//! - `SearcherManager`: the default `ViewManager`
//! - `ReadViewProvider`: opens the initial view and builds its manager
//!
//! Readers get an `Arc` of the view they acquired. A refresh swaps the
//! manager's current view; views already handed out stay valid until their
//! last holder lets go.

use crate::directory::Directory;
use crate::reader::DirectoryReader;
use parking_lot::{Mutex, RwLock};
use shadow_core::{IndexError, IndexResult, ShardId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Hands out and refreshes read views
pub trait ViewManager: Send + Sync {
    /// Borrow the current view; must be given back with `release`
    fn acquire(&self) -> IndexResult<Arc<DirectoryReader>>;

    /// Give back a view obtained from `acquire`
    fn release(&self, view: Arc<DirectoryReader>) -> IndexResult<()>;

    /// True if the current view reflects the latest commit
    fn is_searcher_current(&self) -> IndexResult<bool>;

    /// Swap in a newer view if one exists, waiting for any refresh in flight
    fn maybe_refresh_blocking(&self) -> IndexResult<()>;

    /// Drop the current view; later acquisitions fail
    fn close(&self) -> IndexResult<()>;
}

/// Opens read views and builds their managers
pub trait ReadViewProvider: Send + Sync {
    /// Open a view on the latest commit in `directory`
    fn open(&self, directory: &Directory) -> IndexResult<DirectoryReader>;

    /// Newer view than `view`, or `None` if it is current
    ///
    /// `SearcherManager` reopens through this on every refresh.
    fn open_if_changed(&self, view: &DirectoryReader) -> IndexResult<Option<DirectoryReader>>;

    /// Tag a view with the shard it serves
    fn wrap(&self, view: DirectoryReader, shard_id: &ShardId) -> DirectoryReader;

    /// Manager serving `view` as its initial view
    fn new_manager(&self, view: DirectoryReader) -> IndexResult<Arc<dyn ViewManager>>;
}

// ============================================================================
// SearcherManager
// ============================================================================

/// Default `ViewManager` over `DirectoryReader`s
pub struct SearcherManager {
    /// None once closed
    current: RwLock<Option<Arc<DirectoryReader>>>,
    /// Serializes refreshes
    refresh_lock: Mutex<()>,
    /// Views acquired and not yet released
    outstanding: AtomicUsize,
    /// Reopens the current view on refresh
    provider: Arc<dyn ReadViewProvider>,
}

impl SearcherManager {
    /// Manager with `view` as its initial view
    pub fn new(view: DirectoryReader) -> Self {
        Self::with_provider(view, Arc::new(DirectoryReaderProvider))
    }

    /// Manager that refreshes through `provider`
    pub fn with_provider(view: DirectoryReader, provider: Arc<dyn ReadViewProvider>) -> Self {
        SearcherManager {
            current: RwLock::new(Some(Arc::new(view))),
            refresh_lock: Mutex::new(()),
            outstanding: AtomicUsize::new(0),
            provider,
        }
    }

    /// Views acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Generation of the current view, if open
    pub fn current_generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|v| v.generation())
    }

    fn closed_error() -> IndexError {
        IndexError::AlreadyClosed("this SearcherManager is closed".to_string())
    }
}

impl ViewManager for SearcherManager {
    fn acquire(&self) -> IndexResult<Arc<DirectoryReader>> {
        let current = self.current.read();
        match current.as_ref() {
            Some(view) => {
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                Ok(Arc::clone(view))
            }
            None => Err(Self::closed_error()),
        }
    }

    fn release(&self, view: Arc<DirectoryReader>) -> IndexResult<()> {
        drop(view);
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| IndexError::InvalidState("released more views than acquired".to_string()))
    }

    fn is_searcher_current(&self) -> IndexResult<bool> {
        let view = self.acquire()?;
        let result = view.is_current();
        self.release(view)?;
        result
    }

    fn maybe_refresh_blocking(&self) -> IndexResult<()> {
        let _refreshing = self.refresh_lock.lock();
        let view = self.acquire()?;
        let reopened = self.provider.open_if_changed(&view);
        self.release(view)?;

        if let Some(newer) = reopened? {
            let generation = newer.generation();
            let mut current = self.current.write();
            if current.is_none() {
                return Err(Self::closed_error());
            }
            *current = Some(Arc::new(newer));
            debug!(target: "shadow::index", generation, "Swapped in refreshed view");
        }
        Ok(())
    }

    fn close(&self) -> IndexResult<()> {
        self.current.write().take();
        Ok(())
    }
}

// ============================================================================
// DirectoryReaderProvider
// ============================================================================

/// Default provider: `DirectoryReader` views served by a `SearcherManager`
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryReaderProvider;

impl ReadViewProvider for DirectoryReaderProvider {
    fn open(&self, directory: &Directory) -> IndexResult<DirectoryReader> {
        DirectoryReader::open(directory)
    }

    fn open_if_changed(&self, view: &DirectoryReader) -> IndexResult<Option<DirectoryReader>> {
        view.open_if_changed()
    }

    fn wrap(&self, view: DirectoryReader, shard_id: &ShardId) -> DirectoryReader {
        view.wrap(shard_id)
    }

    fn new_manager(&self, view: DirectoryReader) -> IndexResult<Arc<dyn ViewManager>> {
        Ok(Arc::new(SearcherManager::with_provider(view, Arc::new(*self))))
    }
}
