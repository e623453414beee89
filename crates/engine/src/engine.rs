//! Shard engine call surface
//!
//! Shard-level callers drive every engine kind through this trait. A
//! read-only replica routes all write operations to no-ops; a read/write
//! engine (registered by the embedding application) applies them.

use crate::factory::EngineKind;
use crate::listener::RecoveryHandler;
use crate::operation::{Create, Delete, DeleteByQuery, ForceMergeOptions, Get, GetResult, Index};
use crate::searcher::Searcher;
use crate::segments::{Segment, SegmentsStats};
use crate::state::EngineState;
use shadow_core::{Cause, EngineResult, ShardId};
use shadow_storage::SnapshotIndexCommit;

/// Operations every shard engine provides
pub trait Engine: Send + Sync {
    /// Shard served
    fn shard_id(&self) -> &ShardId;

    /// Which kind of engine this is
    fn kind(&self) -> EngineKind;

    /// Current lifecycle state
    fn state(&self) -> EngineState;

    // ========================================================================
    // Write path
    // ========================================================================

    /// Create a document
    fn create(&self, create: &Create) -> EngineResult<()>;

    /// Index a document
    fn index(&self, index: &Index) -> EngineResult<()>;

    /// Delete a document
    fn delete(&self, delete: &Delete) -> EngineResult<()>;

    /// Delete documents matching a query
    fn delete_by_query(&self, delete: &DeleteByQuery) -> EngineResult<()>;

    /// Flush with default options
    fn flush(&self) -> EngineResult<()> {
        self.flush_with(false, false)
    }

    /// Flush, optionally forcing a commit and waiting for a running flush
    fn flush_with(&self, force: bool, wait_if_ongoing: bool) -> EngineResult<()>;

    /// Merge segments
    fn force_merge(&self, options: ForceMergeOptions) -> EngineResult<()>;

    // ========================================================================
    // Read path
    // ========================================================================

    /// Look up a live document by id
    fn get(&self, get: &Get) -> EngineResult<GetResult>;

    /// Borrow the current read view
    fn acquire_searcher(&self, source: &str) -> EngineResult<Searcher>;

    /// Pick up the latest commit point
    fn refresh(&self, source: &str) -> EngineResult<()>;

    /// True if a newer commit point than the current view exists
    fn refresh_needed(&self) -> EngineResult<bool>;

    // ========================================================================
    // Recovery and lifecycle
    // ========================================================================

    /// Pin the latest commit point
    fn snapshot_index(&self) -> EngineResult<SnapshotIndexCommit>;

    /// Hand a consistent commit point to a recovery target
    fn recover(&self, handler: &mut dyn RecoveryHandler) -> EngineResult<()>;

    /// Mark the engine failed; the first cause wins
    fn fail_engine(&self, reason: &str, cause: Cause);

    /// Release the engine's resources; idempotent
    fn close(&self);

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Segments of the current view, ascending by generation
    fn segments(&self, verbose: bool) -> EngineResult<Vec<Segment>>;

    /// Memory statistics of the current view
    fn segments_stats(&self) -> EngineResult<SegmentsStats>;
}
