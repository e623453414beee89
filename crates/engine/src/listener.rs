//! Failure notification and recovery callbacks

use shadow_core::{Cause, ShardId};
use shadow_storage::SnapshotIndexCommit;
use std::error::Error as StdError;

/// Told when an engine fails
///
/// Called at most once per engine, outside every engine lock, so it may call
/// back into the engine (for example to close it). Panics are caught and
/// logged.
pub trait FailedEngineListener: Send + Sync {
    /// The engine serving `shard_id` failed
    fn on_failed_engine(&self, shard_id: &ShardId, reason: &str, cause: &Cause);
}

impl<F> FailedEngineListener for F
where
    F: Fn(&ShardId, &str, &Cause) + Send + Sync,
{
    fn on_failed_engine(&self, shard_id: &ShardId, reason: &str, cause: &Cause) {
        self(shard_id, reason, cause)
    }
}

/// Listener that ignores failures
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFailedEngineListener;

impl FailedEngineListener for NoopFailedEngineListener {
    fn on_failed_engine(&self, _shard_id: &ShardId, _reason: &str, _cause: &Cause) {}
}

/// Receives the commit point handed out by `recover`
pub trait RecoveryHandler {
    /// Copy what the recovery target needs from `snapshot`
    ///
    /// The snapshot stays pinned until this returns. Not retried on error.
    fn phase1(
        &mut self,
        snapshot: &SnapshotIndexCommit,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

impl<F> RecoveryHandler for F
where
    F: FnMut(&SnapshotIndexCommit) -> Result<(), Box<dyn StdError + Send + Sync>>,
{
    fn phase1(
        &mut self,
        snapshot: &SnapshotIndexCommit,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self(snapshot)
    }
}
