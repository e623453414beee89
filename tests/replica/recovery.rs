//! Recovery handoff from a replica to a new shard copy

use crate::common::*;
use shadowdb::{Get, IndexCommit};
use std::error::Error as StdError;
use std::sync::Arc;

type HandlerResult = Result<(), Box<dyn StdError + Send + Sync>>;

#[test]
fn recovery_target_opens_the_pinned_commit() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a", "b"]);
    let store = index.store(0);
    let engine = ShadowEngine::new(index.config(&store)).unwrap();
    let target = Directory::open(index.scratch("target")).unwrap();

    let mut pinned_generation = 0;
    {
        let primary = &mut index;
        let mut handler = |snapshot: &SnapshotIndexCommit| -> HandlerResult {
            pinned_generation = snapshot.generation();
            assert_eq!(engine.ongoing_recoveries(), 1);

            // the primary keeps committing while the copy runs
            primary.commit_docs(&["c"]);
            primary.commit_deletes(&["a"]);
            assert!(primary.dir.exists(&snapshot.segments_file_name()));

            copy_commit(snapshot, &primary.dir, &target);
            Ok(())
        };
        engine.recover(&mut handler).unwrap();
    }
    assert_eq!(engine.ongoing_recoveries(), 0);
    assert_eq!(index.policy.snapshot_count(), 0);

    let copied = IndexCommit::read_latest(&target).unwrap();
    assert_eq!(copied.generation(), pinned_generation);

    let target_store = Arc::new(Store::new(ShardId::new("logs", 1), target));
    let recovered = ShadowEngine::new(EngineConfig::new(Arc::clone(&target_store))).unwrap();
    assert_eq!(visible_ids(&recovered), vec!["a", "b"]);
    assert!(recovered.get(&Get::new("a")).unwrap().exists());
    drop(recovered);
    assert_eq!(target_store.ref_count(), 1);
}

#[test]
fn snapshot_for_backup_survives_primary_commits() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a"]);
    let store = index.store(0);
    let engine = ShadowEngine::new(index.config(&store)).unwrap();

    let snapshot = engine.snapshot_index().unwrap();
    let pinned = snapshot.segments_file_name();
    index.commit_docs(&["b"]);
    index.commit_docs(&["c"]);
    assert!(index.dir.exists(&pinned));

    drop(snapshot);
    index.commit_docs(&["d"]);
    assert!(!index.dir.exists(&pinned));
}

#[test]
fn failed_copy_reports_recovery_failure() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a"]);
    let store = index.store(0);
    let engine = ShadowEngine::new(index.config(&store)).unwrap();

    let mut handler = |_: &SnapshotIndexCommit| -> HandlerResult {
        Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "target went away",
        )))
    };
    let err = engine.recover(&mut handler).unwrap_err();
    assert!(matches!(err, EngineError::RecoveryFailed { .. }));
    assert!(engine.state().is_open());
    assert_eq!(engine.ongoing_recoveries(), 0);
    assert_eq!(index.policy.snapshot_count(), 0);
    assert_eq!(store.ref_count(), 2);
}
