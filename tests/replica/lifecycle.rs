//! Replica lifecycle: open, follow the primary, fail, close

use crate::common::*;
use shadowdb::{Create, Delete, ForceMergeOptions, Get, Index};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn replica(index: &SharedIndex, store: &Arc<Store>) -> Box<dyn Engine> {
    EngineFactoryRegistry::new()
        .new_engine(false, &shadow_settings(), index.config(store))
        .unwrap()
}

#[test]
fn replica_follows_primary_commits() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a", "b"]);
    let store = index.store(0);
    let engine = replica(&index, &store);

    assert_eq!(engine.kind(), EngineKind::ReadOnlyReplica);
    assert_eq!(visible_ids(engine.as_ref()), vec!["a", "b"]);
    assert!(!engine.refresh_needed().unwrap());

    index.commit_docs(&["c"]);
    index.commit_deletes(&["a"]);

    // not visible until refreshed
    assert_eq!(visible_ids(engine.as_ref()), vec!["a", "b"]);
    assert!(engine.refresh_needed().unwrap());

    engine.refresh("test").unwrap();
    assert!(!engine.refresh_needed().unwrap());
    assert_eq!(visible_ids(engine.as_ref()), vec!["b", "c"]);
    assert!(!engine.get(&Get::new("a")).unwrap().exists());
    let got = engine.get(&Get::new("c")).unwrap();
    assert_eq!(got.document.unwrap().source, json!({ "id": "c" }));

    engine.close();
    assert_eq!(store.ref_count(), 1);
}

#[test]
fn replica_writes_leave_the_index_untouched() {
    let mut index = SharedIndex::new();
    let generation = index.commit_docs(&["a"]);
    let store = index.store(0);
    let engine = replica(&index, &store);
    let listed = index.dir.list_all().unwrap();

    engine
        .create(&Create::new(Document::new("x", json!({}))))
        .unwrap();
    engine
        .index(&Index::new(Document::new("a", json!({ "v": 2 }))))
        .unwrap();
    engine.delete(&Delete::new("a")).unwrap();
    engine.flush().unwrap();
    engine.force_merge(ForceMergeOptions::default()).unwrap();
    engine.refresh("test").unwrap();

    assert_eq!(index.dir.list_all().unwrap(), listed);
    assert_eq!(visible_ids(engine.as_ref()), vec!["a"]);
    assert_eq!(engine.get(&Get::new("a")).unwrap().generation, generation);
}

#[test]
fn segments_follow_the_refreshed_view() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a"]);
    index.commit_docs(&["b", "c"]);
    let store = index.store(0);
    let engine = replica(&index, &store);

    index.commit_docs(&["d"]);
    let segments = engine.segments(false).unwrap();
    let names: Vec<&str> = segments.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["_0", "_1"]);
    assert!(segments.iter().all(|s| s.search && s.committed));

    engine.refresh("test").unwrap();
    let segments = engine.segments(false).unwrap();
    let names: Vec<&str> = segments.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["_0", "_1", "_2"]);
    assert_eq!(segments.iter().map(|s| s.doc_count).sum::<u32>(), 4);

    let stats = engine.segments_stats().unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.index_writer_memory_in_bytes, 0);
    assert_eq!(stats.version_map_memory_in_bytes, 0);
}

#[test]
fn corruption_seen_on_refresh_fails_the_replica() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a"]);
    let store = index.store(0);
    let failures = Arc::new(AtomicUsize::new(0));
    let engine = ShadowEngine::new(
        index
            .config(&store)
            .with_listener(counting_listener(&failures)),
    )
    .unwrap();

    index.commit_docs(&["b"]);
    corrupt_file(index.dir.path(), "_1.seg");

    let err = engine.refresh("test").unwrap_err();
    assert!(matches!(err, EngineError::RefreshFailed { .. }));
    assert!(engine.state().is_failed());
    assert!(store.is_marked_corrupted().unwrap());
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    let err = engine.acquire_searcher("after").unwrap_err();
    assert!(err.is_closed());
    assert!(err.cause().unwrap().is_corruption());

    drop(engine);
    assert_eq!(store.ref_count(), 1);
}

#[test]
fn replicas_share_one_directory() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a"]);
    let stores: Vec<_> = (0..3).map(|shard| index.store(shard)).collect();
    let engines: Vec<_> = stores.iter().map(|s| replica(&index, s)).collect();

    index.commit_docs(&["b"]);
    engines[1].refresh("test").unwrap();

    assert_eq!(visible_ids(engines[0].as_ref()), vec!["a"]);
    assert_eq!(visible_ids(engines[1].as_ref()), vec!["a", "b"]);
    assert_eq!(visible_ids(engines[2].as_ref()), vec!["a"]);

    engines[0].fail_engine("test", Cause::msg("boom"));
    assert!(engines[0].state().is_failed());
    assert!(engines[2].state().is_open());

    drop(engines);
    assert!(stores.iter().all(|s| s.ref_count() == 1));
}
