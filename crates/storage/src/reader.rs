//! Point-in-time read view over a directory
//!
//! A `DirectoryReader` is opened against the latest commit point and never
//! changes afterwards. Newer commits are picked up by opening a new reader
//! (`open_if_changed`), which reuses the loaded segments it can.

use crate::commit::IndexCommit;
use crate::directory::Directory;
use crate::segment::{Document, SegmentReader};
use shadow_core::{IndexResult, ShardId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Immutable view of one commit point
pub struct DirectoryReader {
    directory: Directory,
    commit: IndexCommit,
    leaves: Vec<Arc<SegmentReader>>,
    shard_id: Option<ShardId>,
}

impl DirectoryReader {
    /// Open the latest commit in `directory`
    pub fn open(directory: &Directory) -> IndexResult<Self> {
        let commit = IndexCommit::read_latest(directory)?;
        let leaves = commit
            .segments()
            .iter()
            .map(|info| SegmentReader::open(directory, info).map(Arc::new))
            .collect::<IndexResult<Vec<_>>>()?;
        trace!(
            target: "shadow::index",
            generation = commit.generation(),
            segments = leaves.len(),
            "Opened directory reader"
        );
        Ok(DirectoryReader {
            directory: directory.clone(),
            commit,
            leaves,
            shard_id: None,
        })
    }

    /// Reader over the latest commit, or `None` if this reader is already on it
    ///
    /// Segments whose metadata did not change are shared with this reader;
    /// segments whose deletions changed share their loaded data.
    pub fn open_if_changed(&self) -> IndexResult<Option<Self>> {
        match IndexCommit::latest_generation(&self.directory)? {
            Some(generation) if generation != self.commit.generation() => {}
            _ => return Ok(None),
        }

        let commit = IndexCommit::read_latest(&self.directory)?;
        let existing: HashMap<&str, &Arc<SegmentReader>> =
            self.leaves.iter().map(|l| (l.name(), l)).collect();

        let mut leaves = Vec::with_capacity(commit.segment_count());
        for info in commit.segments() {
            let leaf = match existing.get(info.name.as_str()) {
                Some(old) if old.info() == info => Arc::clone(old),
                Some(old) if old.max_doc() == info.max_doc => Arc::new(old.with_deletions(info)?),
                _ => Arc::new(SegmentReader::open(&self.directory, info)?),
            };
            leaves.push(leaf);
        }

        trace!(
            target: "shadow::index",
            from = self.commit.generation(),
            to = commit.generation(),
            "Reopened directory reader"
        );
        Ok(Some(DirectoryReader {
            directory: self.directory.clone(),
            commit,
            leaves,
            shard_id: self.shard_id.clone(),
        }))
    }

    /// Tag the reader with the shard it serves
    pub fn wrap(mut self, shard_id: &ShardId) -> Self {
        self.shard_id = Some(shard_id.clone());
        self
    }

    /// Shard this reader was wrapped for
    pub fn shard_id(&self) -> Option<&ShardId> {
        self.shard_id.as_ref()
    }

    /// True if no newer commit exists in the directory
    pub fn is_current(&self) -> IndexResult<bool> {
        Ok(IndexCommit::latest_generation(&self.directory)? == Some(self.commit.generation()))
    }

    /// Commit point this reader was opened on
    pub fn commit(&self) -> &IndexCommit {
        &self.commit
    }

    /// Commit generation
    pub fn generation(&self) -> u64 {
        self.commit.generation()
    }

    /// Directory this reader reads from
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Per-segment readers, in commit order
    pub fn leaves(&self) -> &[Arc<SegmentReader>] {
        &self.leaves
    }

    /// Live documents across all segments
    pub fn num_docs(&self) -> u64 {
        self.leaves.iter().map(|l| u64::from(l.num_docs())).sum()
    }

    /// Documents across all segments, deleted ones included
    pub fn max_doc(&self) -> u64 {
        self.leaves.iter().map(|l| u64::from(l.max_doc())).sum()
    }

    /// Live document with this id; newer segments win
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.leaves.iter().rev().find_map(|leaf| leaf.get(id))
    }

    /// All live documents, in commit order
    pub fn documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.leaves.iter().flat_map(|leaf| leaf.live_documents())
    }
}

impl std::fmt::Debug for DirectoryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryReader")
            .field("generation", &self.commit.generation())
            .field("leaves", &self.leaves)
            .field("shard_id", &self.shard_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::IndexWriter;
    use serde_json::json;
    use shadow_core::IndexError;
    use tempfile::TempDir;

    fn index_with(dir: &Directory, ids: &[&str]) -> IndexWriter {
        let mut writer = IndexWriter::open(dir).unwrap();
        for id in ids {
            writer.add_document(Document::new(*id, json!({ "id": id })));
        }
        writer.commit().unwrap();
        writer
    }

    #[test]
    fn test_open_empty_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::open(tmp.path()).unwrap();
        let err = DirectoryReader::open(&dir).unwrap_err();
        assert!(matches!(err, IndexError::IndexNotFound(_)));
    }

    #[test]
    fn test_open_sees_committed_documents() {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::open(tmp.path()).unwrap();
        index_with(&dir, &["a", "b"]);

        let reader = DirectoryReader::open(&dir).unwrap();
        assert_eq!(reader.num_docs(), 2);
        assert_eq!(reader.leaves().len(), 1);
        assert!(reader.get("a").is_some());
        assert!(reader.is_current().unwrap());
        assert_eq!(reader.documents().count(), 2);
    }

    #[test]
    fn test_open_if_changed() {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::open(tmp.path()).unwrap();
        let mut writer = index_with(&dir, &["a"]);

        let reader = DirectoryReader::open(&dir).unwrap().wrap(&ShardId::new("i", 0));
        assert!(reader.open_if_changed().unwrap().is_none());

        writer.add_document(Document::new("b", json!({})));
        writer.commit().unwrap();
        assert!(!reader.is_current().unwrap());

        let newer = reader.open_if_changed().unwrap().unwrap();
        assert_eq!(newer.num_docs(), 2);
        assert_eq!(newer.leaves().len(), 2);
        assert!(Arc::ptr_eq(&reader.leaves()[0], &newer.leaves()[0]));
        assert_eq!(newer.shard_id(), Some(&ShardId::new("i", 0)));

        // the old view is unaffected
        assert_eq!(reader.num_docs(), 1);
        assert!(reader.get("b").is_none());
    }

    #[test]
    fn test_reopen_picks_up_deletions() {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::open(tmp.path()).unwrap();
        let mut writer = index_with(&dir, &["a", "b"]);
        let reader = DirectoryReader::open(&dir).unwrap();

        writer.delete_document("a");
        writer.commit().unwrap();

        let newer = reader.open_if_changed().unwrap().unwrap();
        assert_eq!(newer.num_docs(), 1);
        assert_eq!(newer.max_doc(), 2);
        assert!(newer.get("a").is_none());
        assert!(reader.get("a").is_some());
    }
}
