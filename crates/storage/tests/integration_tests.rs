//! Storage integration tests
//!
//! A writer and independent read views over one directory, the way a
//! primary and its shadow replicas share files.

use serde_json::json;
use shadow_core::{IndexError, ShardId};
use shadow_storage::{
    Directory, DirectoryReader, DirectoryReaderProvider, Document, IndexCommit, IndexWriter,
    ReadViewProvider, SearcherManager, SnapshotDeletionPolicy, Store, ViewManager,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn setup() -> (TempDir, Directory, IndexWriter) {
    let tmp = TempDir::new().unwrap();
    let dir = Directory::open(tmp.path()).unwrap();
    let writer = IndexWriter::open(&dir).unwrap();
    (tmp, dir, writer)
}

fn ids(reader: &DirectoryReader) -> Vec<String> {
    let mut ids: Vec<String> = reader.documents().map(|d| d.id.clone()).collect();
    ids.sort();
    ids
}

#[test]
fn manager_follows_writer_and_old_views_stay_stable() {
    let (_tmp, dir, mut writer) = setup();
    writer.add_document(Document::new("a", json!(1)));
    writer.commit().unwrap();

    let provider = DirectoryReaderProvider;
    let view = provider.wrap(provider.open(&dir).unwrap(), &ShardId::new("idx", 0));
    let manager = provider.new_manager(view).unwrap();
    let old = manager.acquire().unwrap();

    writer.add_document(Document::new("b", json!(2)));
    writer.delete_document("a");
    writer.commit().unwrap();
    assert!(!manager.is_searcher_current().unwrap());
    manager.maybe_refresh_blocking().unwrap();
    assert!(manager.is_searcher_current().unwrap());

    let new = manager.acquire().unwrap();
    assert_eq!(ids(&old), vec!["a"]);
    assert_eq!(ids(&new), vec!["b"]);
    assert_eq!(new.shard_id(), Some(&ShardId::new("idx", 0)));

    manager.release(old).unwrap();
    manager.release(new).unwrap();
    manager.close().unwrap();
    assert!(manager.acquire().unwrap_err().is_already_closed());
}

#[test]
fn corrupt_commit_is_detected_by_a_reader() {
    let (_tmp, dir, mut writer) = setup();
    writer.add_document(Document::new("a", json!(1)));
    let generation = writer.commit().unwrap();

    let file = shadow_storage::segments_file_name(generation);
    let mut bytes = dir.read(&file).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    dir.write_atomic(&file, &bytes).unwrap();

    let err = DirectoryReader::open(&dir).unwrap_err();
    assert!(err.is_corruption(), "expected corruption, got {}", err);
}

#[test]
fn truncated_segment_is_corruption() {
    let (_tmp, dir, mut writer) = setup();
    writer.add_document(Document::new("a", json!({ "body": "x".repeat(64) })));
    writer.commit().unwrap();

    let bytes = dir.read("_0.seg").unwrap();
    dir.write_atomic("_0.seg", &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(
        DirectoryReader::open(&dir),
        Err(IndexError::Corruption { .. })
    ));
}

#[test]
fn empty_directory_has_no_index() {
    let tmp = TempDir::new().unwrap();
    let dir = Directory::open(tmp.path()).unwrap();
    assert!(matches!(
        DirectoryReader::open(&dir),
        Err(IndexError::IndexNotFound(_))
    ));
}

#[test]
fn readers_keep_up_with_a_committing_writer() {
    let (_tmp, dir, mut writer) = setup();
    writer.add_document(Document::new("seed", json!(0)));
    writer.commit().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let dir = dir.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let manager = SearcherManager::new(DirectoryReader::open(&dir).unwrap());
                let mut last = 0;
                while !stop.load(Ordering::Acquire) {
                    manager.maybe_refresh_blocking().unwrap();
                    let view = manager.acquire().unwrap();
                    assert!(view.generation() >= last);
                    assert!(view.get("seed").is_some());
                    last = view.generation();
                    manager.release(view).unwrap();
                }
                assert_eq!(manager.outstanding(), 0);
            })
        })
        .collect();

    for n in 0..50 {
        writer.add_document(Document::new(format!("doc-{}", n), json!(n)));
        writer.commit().unwrap();
    }
    stop.store(true, Ordering::Release);
    for h in readers {
        h.join().unwrap();
    }

    let latest = IndexCommit::read_latest(&dir).unwrap();
    assert_eq!(latest.generation(), writer.generation());
}

#[test]
fn snapshot_outlives_pruning_and_store_refs_balance() {
    let (tmp, dir, writer) = setup();
    let policy = SnapshotDeletionPolicy::new();
    let mut writer = writer.with_deletion_policy(policy.clone());
    writer.add_document(Document::new("a", json!(1)));
    writer.commit().unwrap();

    let store = Store::new(ShardId::new("idx", 0), dir.clone());
    store.inc_ref().unwrap();
    let snapshot = policy.snapshot(store.directory()).unwrap();

    writer.add_document(Document::new("b", json!(2)));
    writer.commit().unwrap();
    for name in snapshot.file_names() {
        assert!(dir.exists(&name), "{} pruned while pinned", name);
    }
    drop(snapshot);
    assert_eq!(policy.snapshot_count(), 0);

    store.dec_ref();
    store.close();
    assert!(store.is_closed());
    assert!(store.inc_ref().is_err());
    drop(tmp);
}

#[test]
fn snapshots_taken_during_commits_keep_their_files() {
    let (_tmp, dir, writer) = setup();
    let policy = SnapshotDeletionPolicy::new();
    let mut writer = writer.with_deletion_policy(policy.clone());
    writer.add_document(Document::new("seed", json!(0)));
    writer.commit().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let taker = {
        let dir = dir.clone();
        let policy = policy.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut taken = 0;
            while !stop.load(Ordering::Acquire) {
                let snapshot = policy.snapshot(&dir).unwrap();
                for name in snapshot.file_names() {
                    assert!(dir.exists(&name), "{} missing from pinned commit", name);
                }
                taken += 1;
            }
            taken
        })
    };

    for n in 0..50 {
        writer.add_document(Document::new(format!("doc-{}", n), json!(n)));
        writer.delete_document(&format!("doc-{}", n.max(1) - 1));
        writer.commit().unwrap();
    }
    stop.store(true, Ordering::Release);
    assert!(taker.join().unwrap() > 0);
    assert_eq!(policy.snapshot_count(), 0);
}
