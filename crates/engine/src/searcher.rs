//! Scoped query-time handle

use shadow_core::IndexResult;
use shadow_storage::{DirectoryReader, Store, ViewManager};
use std::sync::Arc;
use tracing::{trace, warn};

/// A borrowed read view plus the store reference that keeps it readable
///
/// Released exactly once, explicitly or on drop: the view goes back to its
/// manager first, then the store reference is released.
pub struct Searcher {
    source: String,
    reader: Arc<DirectoryReader>,
    manager: Arc<dyn ViewManager>,
    store: Arc<Store>,
    released: bool,
}

impl Searcher {
    pub(crate) fn new(
        source: impl Into<String>,
        reader: Arc<DirectoryReader>,
        manager: Arc<dyn ViewManager>,
        store: Arc<Store>,
    ) -> Self {
        Searcher {
            source: source.into(),
            reader,
            manager,
            store,
            released: false,
        }
    }

    /// Tag of the caller that acquired this searcher
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The read view
    pub fn reader(&self) -> &DirectoryReader {
        &self.reader
    }

    /// True once released
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Give the view back and release the store reference; idempotent
    ///
    /// The store reference is released even if the manager rejects the view.
    pub fn release(&mut self) -> IndexResult<()> {
        if self.released {
            trace!(target: "shadow::engine", source = %self.source, "Searcher already released");
            return Ok(());
        }
        self.released = true;
        let result = self.manager.release(Arc::clone(&self.reader));
        self.store.dec_ref();
        match result {
            Err(e) if e.is_already_closed() => Ok(()),
            other => other,
        }
    }
}

impl Drop for Searcher {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(target: "shadow::engine", source = %self.source, error = %e, "Failed to release searcher");
        }
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("source", &self.source)
            .field("generation", &self.reader.generation())
            .field("released", &self.released)
            .finish()
    }
}
