//! Read-only replica engine
//!
//! A `ShadowEngine` serves reads from index files written by the primary
//! into a shared directory. It never writes: every mutation is accepted and
//! discarded, and `refresh` is how new primary commits become visible.
//!
//! # Locking
//!
//! - `lock` (read/write) serializes structural operations. Shared: refresh,
//!   staleness checks, segment listings, commit snapshots. Exclusive:
//!   recovery bookkeeping and close.
//! - `fail_lock` is taken only with `try_lock` and never while waiting on
//!   `lock`, so a reader stuck under the read lock cannot stop the engine
//!   from being failed.
//! - `state` is a short-lived lock around the lifecycle state; it is never
//!   held across I/O or a callback.
//!
//! Searcher acquisition takes none of these beyond a state check. It is
//! coordinated by the store's reference count and the view manager.
//!
//! # Store references
//!
//! The engine holds one store reference from construction until close (or
//! until construction fails), plus one per outstanding `Searcher` and one per
//! in-flight recovery.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::factory::EngineKind;
use crate::listener::{FailedEngineListener, RecoveryHandler};
use crate::operation::{Create, Delete, DeleteByQuery, ForceMergeOptions, Get, GetResult, Index};
use crate::recovery::RecoveryCounter;
use crate::searcher::Searcher;
use crate::segments::{sort_by_generation, Segment, SegmentsStats};
use crate::state::EngineState;
use parking_lot::{Mutex, RwLock};
use shadow_core::{unwrap_corruption, Cause, EngineError, EngineResult, IndexResult, ShardId};
use shadow_storage::{
    ReadViewProvider, SnapshotDeletionPolicy, SnapshotIndexCommit, Store, ViewManager,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Read-only replica engine over a shared index directory
pub struct ShadowEngine {
    shard_id: ShardId,
    store: Arc<Store>,
    fail_on_corruption: bool,
    listener: Arc<dyn FailedEngineListener>,
    deletion_policy: SnapshotDeletionPolicy,
    /// None if construction failed
    manager: Option<Arc<dyn ViewManager>>,
    lock: RwLock<()>,
    fail_lock: Mutex<()>,
    state: Mutex<EngineState>,
    /// Resources torn down (or never acquired)
    closed: AtomicBool,
    recoveries: RecoveryCounter,
}

impl ShadowEngine {
    /// Build an engine, reporting construction failure as an error
    ///
    /// On failure the listener has already been told and the store
    /// reference taken for the engine has been released.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let engine = Self::open(config);
        match engine.failure() {
            Some(cause) => Err(EngineError::failure(
                &engine.shard_id,
                "failed to open index reader",
                cause,
            )),
            None => Ok(engine),
        }
    }

    /// Build an engine that may already be failed
    ///
    /// If the initial read view cannot be opened the engine is `Failed` with
    /// that error, holds no store reference, and reports `Closed` from every
    /// read, query and recovery operation.
    pub fn open(config: EngineConfig) -> Self {
        let mut engine = ShadowEngine {
            shard_id: config.shard_id().clone(),
            store: Arc::clone(config.store()),
            fail_on_corruption: config.fail_on_corruption(),
            listener: Arc::clone(config.listener()),
            deletion_policy: config.deletion_policy().clone(),
            manager: None,
            lock: RwLock::new(()),
            fail_lock: Mutex::new(()),
            state: Mutex::new(EngineState::Open),
            closed: AtomicBool::new(false),
            recoveries: RecoveryCounter::new(Arc::clone(config.store())),
        };

        if let Err(e) = engine.store.inc_ref() {
            engine.fail_construction(Cause::from(e), false);
            return engine;
        }
        match engine.open_manager(config.provider().as_ref()) {
            Ok(manager) => {
                engine.manager = Some(manager);
                debug!(target: "shadow::engine", shard = %engine.shard_id, "Opened shadow engine");
            }
            Err(e) => {
                warn!(target: "shadow::engine", shard = %engine.shard_id, error = %e, "failed to create new reader");
                engine.fail_construction(Cause::from(e), true);
            }
        }
        engine
    }

    fn open_manager(&self, provider: &dyn ReadViewProvider) -> IndexResult<Arc<dyn ViewManager>> {
        let view = provider.open(self.store.directory())?;
        provider.new_manager(provider.wrap(view, &self.shard_id))
    }

    fn fail_construction(&self, cause: Cause, holds_store_ref: bool) {
        // mark corruption while the store reference is still held
        self.fail_engine("failed to open index reader", cause);
        self.closed.store(true, Ordering::Release);
        if holds_store_ref {
            self.store.dec_ref();
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Recorded failure, if any
    pub fn failure(&self) -> Option<Cause> {
        self.state.lock().failure().cloned()
    }

    /// True once resources were torn down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Recovery sessions in flight
    pub fn ongoing_recoveries(&self) -> usize {
        self.recoveries.get()
    }

    /// Store the engine reads from
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_open(&self) -> EngineResult<()> {
        match &*self.state.lock() {
            EngineState::Open => Ok(()),
            EngineState::Failed(cause) => {
                Err(EngineError::closed(&self.shard_id, Some(cause.clone())))
            }
            EngineState::Closed => Err(EngineError::closed(&self.shard_id, None)),
        }
    }

    fn manager(&self) -> EngineResult<&Arc<dyn ViewManager>> {
        self.manager
            .as_ref()
            .ok_or_else(|| EngineError::closed(&self.shard_id, self.failure()))
    }

    /// Chain `cause` under a closed error once the engine stopped serving
    fn wrap_if_closed(&self, cause: Cause) -> Cause {
        if self.state.lock().is_open() {
            cause
        } else {
            Cause::new(EngineError::closed(&self.shard_id, Some(cause)))
        }
    }

    /// Fail the engine for corruption (if configured) or out-of-memory
    ///
    /// Returns true if the engine was failed.
    fn maybe_fail_engine(&self, source: &str, cause: &Cause) -> bool {
        if cause.is_corruption() {
            if self.fail_on_corruption {
                self.fail_engine(
                    &format!("corrupt file detected source: [{}]", source),
                    cause.clone(),
                );
                return true;
            }
            warn!(
                target: "shadow::engine",
                shard = %self.shard_id,
                source,
                error = %cause,
                "corrupt file detected but fail_on_corruption is disabled"
            );
        } else if cause.is_out_of_memory() {
            self.fail_engine("out of memory", cause.clone());
            return true;
        }
        false
    }
}

/// Releases one store reference on drop
struct StoreRef<'a>(&'a Store);

impl Drop for StoreRef<'_> {
    fn drop(&mut self) {
        self.0.dec_ref();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("(non-string panic)")
}

impl Engine for ShadowEngine {
    fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    fn kind(&self) -> EngineKind {
        EngineKind::ReadOnlyReplica
    }

    fn state(&self) -> EngineState {
        self.state.lock().clone()
    }

    // ========================================================================
    // Write path: accepted and discarded
    // ========================================================================

    fn create(&self, create: &Create) -> EngineResult<()> {
        info!(target: "shadow::engine", shard = %self.shard_id, id = create.id(), "cowardly refusing to CREATE");
        Ok(())
    }

    fn index(&self, index: &Index) -> EngineResult<()> {
        info!(target: "shadow::engine", shard = %self.shard_id, id = index.id(), "cowardly refusing to INDEX");
        Ok(())
    }

    fn delete(&self, delete: &Delete) -> EngineResult<()> {
        info!(target: "shadow::engine", shard = %self.shard_id, id = %delete.id, "cowardly refusing to DELETE");
        Ok(())
    }

    fn delete_by_query(&self, _delete: &DeleteByQuery) -> EngineResult<()> {
        info!(target: "shadow::engine", shard = %self.shard_id, "cowardly refusing to DELETE-BY-QUERY");
        Ok(())
    }

    fn flush_with(&self, force: bool, wait_if_ongoing: bool) -> EngineResult<()> {
        info!(target: "shadow::engine", shard = %self.shard_id, force, wait_if_ongoing, "cowardly refusing to FLUSH");
        Ok(())
    }

    fn force_merge(&self, options: ForceMergeOptions) -> EngineResult<()> {
        info!(
            target: "shadow::engine",
            shard = %self.shard_id,
            max_num_segments = ?options.max_num_segments,
            "cowardly refusing to FORCE_MERGE"
        );
        Ok(())
    }

    // ========================================================================
    // Read path
    // ========================================================================

    fn get(&self, get: &Get) -> EngineResult<GetResult> {
        // no write buffer to consult; the searcher is authoritative
        let searcher = self.acquire_searcher("get")?;
        let reader = searcher.reader();
        Ok(GetResult {
            document: reader.get(&get.id).cloned(),
            generation: reader.generation(),
        })
    }

    fn acquire_searcher(&self, source: &str) -> EngineResult<Searcher> {
        self.ensure_open()?;
        let manager = self.manager()?;

        if let Err(e) = self.store.inc_ref() {
            self.ensure_open()?;
            return Err(EngineError::QueryAcquisitionFailed {
                shard_id: self.shard_id.clone(),
                source_tag: source.to_string(),
                cause: e.into(),
            });
        }
        match manager.acquire() {
            Ok(reader) => Ok(Searcher::new(
                source,
                reader,
                Arc::clone(manager),
                Arc::clone(&self.store),
            )),
            Err(e) => {
                self.store.dec_ref();
                self.ensure_open()?;
                error!(target: "shadow::engine", shard = %self.shard_id, source, error = %e, "failed to acquire searcher");
                Err(EngineError::QueryAcquisitionFailed {
                    shard_id: self.shard_id.clone(),
                    source_tag: source.to_string(),
                    cause: e.into(),
                })
            }
        }
    }

    fn refresh(&self, source: &str) -> EngineResult<()> {
        let result = {
            let _read = self.lock.read();
            self.ensure_open()?;
            self.manager()?.maybe_refresh_blocking()
        };
        match result {
            Ok(()) => {
                trace!(target: "shadow::engine", shard = %self.shard_id, source, "Refreshed");
                Ok(())
            }
            Err(e) if e.is_already_closed() => self.ensure_open(),
            Err(e) => {
                let cause = Cause::from(e);
                self.fail_engine("refresh failed", cause.clone());
                Err(EngineError::RefreshFailed {
                    shard_id: self.shard_id.clone(),
                    cause,
                })
            }
        }
    }

    fn refresh_needed(&self) -> EngineResult<bool> {
        if !self.store.try_inc_ref() {
            return Ok(false);
        }
        let _store_ref = StoreRef(&self.store);
        let manager = self.manager()?;

        let current = {
            let _read = self.lock.read();
            manager.is_searcher_current()
        };
        match current {
            Ok(current) => Ok(!current),
            Err(e) if e.is_already_closed() => {
                self.ensure_open()?;
                Ok(false)
            }
            Err(e) => {
                error!(target: "shadow::engine", shard = %self.shard_id, error = %e, "failed to access searcher manager");
                let cause = Cause::from(e);
                self.fail_engine("failed to access searcher manager", cause.clone());
                Err(EngineError::failure(
                    &self.shard_id,
                    "failed to access searcher manager",
                    cause,
                ))
            }
        }
    }

    // ========================================================================
    // Recovery and lifecycle
    // ========================================================================

    fn snapshot_index(&self) -> EngineResult<SnapshotIndexCommit> {
        // flush outside the read lock
        self.flush_with(false, true)?;
        let _read = self.lock.read();
        self.ensure_open()?;
        self.deletion_policy
            .snapshot(self.store.directory())
            .map_err(|e| EngineError::SnapshotFailed {
                shard_id: self.shard_id.clone(),
                cause: e.into(),
            })
    }

    fn recover(&self, handler: &mut dyn RecoveryHandler) -> EngineResult<()> {
        let recovery = {
            let _write = self.lock.write();
            self.ensure_open()?;
            self.recoveries
                .start_recovery()
                .map_err(|e| EngineError::closed(&self.shard_id, Some(e.into())))?
        };
        debug!(target: "shadow::engine", shard = %self.shard_id, "Starting recovery");

        let snapshot = match self.deletion_policy.snapshot(self.store.directory()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let cause = Cause::from(e);
                self.maybe_fail_engine("recovery", &cause);
                drop(recovery);
                return Err(EngineError::RecoveryFailed {
                    shard_id: self.shard_id.clone(),
                    phase: 1,
                    message: "Snapshot failed".to_string(),
                    cause: self.wrap_if_closed(cause),
                });
            }
        };

        if let Err(e) = handler.phase1(&snapshot) {
            let cause = Cause::from(e);
            self.maybe_fail_engine("recovery phase 1", &cause);
            drop(recovery);
            drop(snapshot);
            return Err(EngineError::RecoveryFailed {
                shard_id: self.shard_id.clone(),
                phase: 1,
                message: "Execution failed".to_string(),
                cause: self.wrap_if_closed(cause),
            });
        }

        let generation = snapshot.generation();
        drop(recovery);
        drop(snapshot);
        debug!(target: "shadow::engine", shard = %self.shard_id, generation, "Recovery finished");
        Ok(())
    }

    fn fail_engine(&self, reason: &str, cause: Cause) {
        let recorded = {
            let Some(_failing) = self.fail_lock.try_lock() else {
                debug!(
                    target: "shadow::engine",
                    shard = %self.shard_id,
                    reason,
                    error = %cause,
                    "tried to fail engine but could not acquire lock, engine should be failed by now"
                );
                return;
            };

            // the marker must exist before anyone can observe the failed state
            if let Some(corruption) = unwrap_corruption(cause.as_error()) {
                if let Err(e) = self.store.mark_store_corrupted(corruption) {
                    warn!(target: "shadow::engine", shard = %self.shard_id, error = %e, "Couldn't mark store corrupted");
                }
            }

            let mut state = self.state.lock();
            if let EngineState::Failed(existing) = &*state {
                debug!(
                    target: "shadow::engine",
                    shard = %self.shard_id,
                    reason,
                    error = %cause,
                    existing = %existing,
                    "tried to fail engine but engine is already failed, ignoring"
                );
                false
            } else {
                warn!(target: "shadow::engine", shard = %self.shard_id, reason, error = %cause, "failed engine");
                *state = EngineState::Failed(cause.clone());
                true
            }
        };

        if recorded {
            let listener = Arc::clone(&self.listener);
            let notified = catch_unwind(AssertUnwindSafe(|| {
                listener.on_failed_engine(&self.shard_id, reason, &cause)
            }));
            if let Err(panic) = notified {
                error!(
                    target: "shadow::engine",
                    shard = %self.shard_id,
                    reason,
                    "failed engine listener panicked: {}",
                    panic_message(&*panic)
                );
            }
        }
    }

    fn close(&self) {
        let _write = self.lock.write();
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(target: "shadow::engine", shard = %self.shard_id, "Engine already closed");
            return;
        }
        {
            let mut state = self.state.lock();
            if state.is_open() {
                *state = EngineState::Closed;
            }
        }

        let _store_ref = StoreRef(&self.store);
        if let Some(manager) = &self.manager {
            if let Err(e) = manager.close() {
                warn!(target: "shadow::engine", shard = %self.shard_id, error = %e, "Failed to close searcher manager");
            }
        }
        debug!(target: "shadow::engine", shard = %self.shard_id, "Closed shadow engine");
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    fn segments(&self, verbose: bool) -> EngineResult<Vec<Segment>> {
        let _read = self.lock.read();
        self.ensure_open()?;
        let searcher = self.acquire_searcher("segments")?;

        let mut segments: Vec<Segment> = searcher
            .reader()
            .leaves()
            .iter()
            .map(|leaf| {
                let mut segment = Segment::from_reader(leaf, verbose);
                // only committed segments are ever visible to a replica
                segment.committed = true;
                segment
            })
            .collect();
        sort_by_generation(&mut segments);
        Ok(segments)
    }

    fn segments_stats(&self) -> EngineResult<SegmentsStats> {
        let _read = self.lock.read();
        self.ensure_open()?;
        let searcher = self.acquire_searcher("segments_stats")?;

        let mut stats = SegmentsStats::new();
        for leaf in searcher.reader().leaves() {
            stats.add_segment(leaf);
        }
        // no version map and no write buffer on a replica
        stats.add_version_map_memory_in_bytes(0);
        stats.add_index_writer_memory_in_bytes(0);
        stats.add_index_writer_max_memory_in_bytes(0);
        Ok(stats)
    }
}

impl Drop for ShadowEngine {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ShadowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowEngine")
            .field("shard_id", &self.shard_id)
            .field("state", &*self.state.lock())
            .field("closed", &self.is_closed())
            .field("ongoing_recoveries", &self.ongoing_recoveries())
            .finish()
    }
}
