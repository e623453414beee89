//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

pub use serde_json::json;
pub use shadowdb::{
    Cause, Directory, Document, Engine, EngineConfig, EngineError, EngineFactoryRegistry,
    EngineKind, EngineSettings, FailedEngineListener, IndexWriter, ShadowEngine, ShardId,
    SnapshotDeletionPolicy, SnapshotIndexCommit, Store,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// SharedIndex - primary writer over a directory replicas read from
// ============================================================================

/// A primary's index directory, shared with any number of replicas.
pub struct SharedIndex {
    pub tmp: TempDir,
    pub dir: Directory,
    pub policy: SnapshotDeletionPolicy,
    pub writer: IndexWriter,
}

impl SharedIndex {
    /// Empty directory with a primary writer; nothing committed yet.
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::open(tmp.path().join("index")).unwrap();
        let policy = SnapshotDeletionPolicy::new();
        let writer = IndexWriter::open(&dir)
            .unwrap()
            .with_deletion_policy(policy.clone());
        SharedIndex {
            tmp,
            dir,
            policy,
            writer,
        }
    }

    /// Index `ids` on the primary and commit them.
    pub fn commit_docs(&mut self, ids: &[&str]) -> u64 {
        for id in ids {
            self.writer
                .add_document(Document::new(*id, json!({ "id": id })));
        }
        self.writer.commit().unwrap()
    }

    /// Delete `ids` on the primary and commit.
    pub fn commit_deletes(&mut self, ids: &[&str]) -> u64 {
        for id in ids {
            self.writer.delete_document(id);
        }
        self.writer.commit().unwrap()
    }

    /// A fresh store over the shared directory.
    pub fn store(&self, shard: u32) -> Arc<Store> {
        Arc::new(Store::new(ShardId::new("logs", shard), self.dir.clone()))
    }

    /// Engine config for a replica store that shares the primary's snapshot pins.
    pub fn config(&self, store: &Arc<Store>) -> EngineConfig {
        EngineConfig::new(Arc::clone(store)).with_deletion_policy(self.policy.clone())
    }

    /// Scratch path inside this index's temp dir.
    pub fn scratch(&self, name: &str) -> std::path::PathBuf {
        self.tmp.path().join(name)
    }
}

/// Settings for a cluster that runs shadow replicas.
pub fn shadow_settings() -> EngineSettings {
    EngineSettings {
        shadow_replicas: true,
        ..EngineSettings::default()
    }
}

/// Copy every file of `commit` from `from` into `to`.
pub fn copy_commit(commit: &SnapshotIndexCommit, from: &Directory, to: &Directory) {
    for name in commit.file_names() {
        let bytes = from.read(&name).unwrap();
        to.write_atomic(&name, &bytes).unwrap();
    }
}

/// Listener that counts notifications.
pub fn counting_listener(count: &Arc<AtomicUsize>) -> Arc<dyn FailedEngineListener> {
    let count = Arc::clone(count);
    Arc::new(move |_: &ShardId, _: &str, _: &Cause| {
        count.fetch_add(1, Ordering::SeqCst);
    })
}

/// Ids of the live documents a fresh searcher sees, sorted.
pub fn visible_ids(engine: &dyn Engine) -> Vec<String> {
    let searcher = engine.acquire_searcher("test").unwrap();
    let mut ids: Vec<String> = searcher
        .reader()
        .documents()
        .map(|d| d.id.clone())
        .collect();
    ids.sort();
    ids
}

/// Flip one byte in the middle of `name`.
pub fn corrupt_file(dir: &Path, name: &str) {
    let path = dir.join(name);
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();
}
