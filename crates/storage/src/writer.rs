//! Primary-side index writer
//!
//! Buffers added and deleted documents and publishes them as a new segment
//! plus a new commit point on `commit()`. Runs on the primary; a replica
//! only ever observes the files it leaves behind. There is no merging:
//! segments accumulate until an external process consolidates them.
//!
//! After each commit, older commit points are pruned unless a
//! `SnapshotDeletionPolicy` holds them, and segment files no longer
//! referenced by any remaining commit are deleted.

use crate::commit::{segments_file_name, IndexCommit};
use crate::directory::Directory;
use crate::segment::{
    generation_from_name, segment_name, write_segment, Document, SegmentCommitInfo, SegmentReader,
};
use crate::snapshot::SnapshotDeletionPolicy;
use shadow_core::IndexResult;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Writes segments and commit points into a directory
pub struct IndexWriter {
    directory: Directory,
    generation: u64,
    next_segment: u64,
    segments: Vec<SegmentCommitInfo>,
    pending_docs: Vec<Document>,
    pending_deletes: Vec<String>,
    user_data: BTreeMap<String, String>,
    policy: Option<SnapshotDeletionPolicy>,
}

impl IndexWriter {
    /// Open a writer, continuing from the latest commit if there is one
    pub fn open(directory: &Directory) -> IndexResult<Self> {
        let (generation, segments, user_data) = match IndexCommit::latest_generation(directory)? {
            Some(generation) => {
                let commit = IndexCommit::read(directory, generation)?;
                (
                    generation,
                    commit.segments().to_vec(),
                    commit.user_data().clone(),
                )
            }
            None => (0, Vec::new(), BTreeMap::new()),
        };
        let next_segment = segments
            .iter()
            .filter_map(|s| generation_from_name(&s.name))
            .max()
            .map_or(0, |g| g + 1);

        Ok(IndexWriter {
            directory: directory.clone(),
            generation,
            next_segment,
            segments,
            pending_docs: Vec::new(),
            pending_deletes: Vec::new(),
            user_data,
            policy: None,
        })
    }

    /// Protect snapshotted commits from pruning
    pub fn with_deletion_policy(mut self, policy: SnapshotDeletionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Buffer a document for the next commit
    ///
    /// A document with an id that is already live replaces it.
    pub fn add_document(&mut self, doc: Document) {
        self.pending_deletes.push(doc.id.clone());
        self.pending_docs.retain(|d| d.id != doc.id);
        self.pending_docs.push(doc);
    }

    /// Buffer a delete for the next commit
    pub fn delete_document(&mut self, id: &str) {
        self.pending_deletes.push(id.to_string());
        self.pending_docs.retain(|d| d.id != id);
    }

    /// Set a user data entry stored with the next commit
    pub fn set_user_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.user_data.insert(key.into(), value.into());
    }

    /// Generation of the last commit written or observed
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Publish buffered changes as a new commit point; returns its generation
    pub fn commit(&mut self) -> IndexResult<u64> {
        if !self.pending_deletes.is_empty() {
            self.apply_deletes()?;
        }

        if !self.pending_docs.is_empty() {
            let name = segment_name(self.next_segment);
            let docs = std::mem::take(&mut self.pending_docs);
            let info = write_segment(&self.directory, &name, docs)?;
            self.next_segment += 1;
            self.segments.push(info);
        }

        let generation = self.generation + 1;
        IndexCommit::write(
            &self.directory,
            generation,
            self.segments.clone(),
            self.user_data.clone(),
        )?;
        self.generation = generation;
        debug!(
            target: "shadow::index",
            generation,
            segments = self.segments.len(),
            "Committed index"
        );

        self.prune_commits()?;
        Ok(generation)
    }

    fn apply_deletes(&mut self) -> IndexResult<()> {
        let ids: HashSet<String> = self.pending_deletes.drain(..).collect();
        for info in self.segments.iter_mut() {
            let reader = SegmentReader::open(&self.directory, info)?;
            for id in &ids {
                if let Some(ord) = reader.ordinal(id) {
                    info.deleted.insert(ord);
                }
            }
        }
        Ok(())
    }

    fn prune_commits(&self) -> IndexResult<()> {
        // no snapshot can be taken until pruning is done
        let pins = self.policy.as_ref().map(|p| p.lock_pins());
        let mut kept_files: HashSet<String> = HashSet::new();
        let mut doomed = Vec::new();

        for generation in IndexCommit::list_generations(&self.directory)? {
            let pinned = pins
                .as_ref()
                .is_some_and(|p| p.contains_key(&generation));
            if generation == self.generation || pinned {
                kept_files.extend(IndexCommit::read(&self.directory, generation)?.file_names());
            } else {
                doomed.push(generation);
            }
        }

        for generation in doomed {
            let file = segments_file_name(generation);
            if let Err(e) = self.directory.delete(&file) {
                warn!(target: "shadow::index", file = %file, error = %e, "Failed to prune commit");
            }
        }

        for file in self.directory.list_all()? {
            let is_segment = file.ends_with(".seg");
            if is_segment && !kept_files.contains(&file) {
                self.directory.delete(&file)?;
            }
        }
        Ok(())
    }
}
