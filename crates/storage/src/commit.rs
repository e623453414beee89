//! Commit points
//!
//! A commit point (`segments_<gen>`, generation in base 36) names the exact
//! set of segments, with their deletions, that make up one consistent,
//! durable state of the index. The highest generation in the directory is
//! the latest commit.

use crate::directory::Directory;
use crate::framing;
use crate::segment::{to_base36, SegmentCommitInfo};
use serde::{Deserialize, Serialize};
use shadow_core::{IndexError, IndexResult};
use std::collections::BTreeMap;

/// Magic bytes for commit files
const COMMIT_MAGIC: &[u8; 4] = b"SCMT";
/// Current commit file version
const COMMIT_FILE_VERSION: u32 = 1;
/// Prefix of commit file names
pub const SEGMENTS_PREFIX: &str = "segments_";

/// Name of the commit file for a generation
pub fn segments_file_name(generation: u64) -> String {
    format!("{}{}", SEGMENTS_PREFIX, to_base36(generation))
}

/// Generation of a commit file name, if it is one
pub fn generation_from_segments_file(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SEGMENTS_PREFIX)?;
    u64::from_str_radix(digits, 36).ok()
}

#[derive(Serialize, Deserialize)]
struct CommitData {
    generation: u64,
    segments: Vec<SegmentCommitInfo>,
    user_data: BTreeMap<String, String>,
}

/// One commit point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCommit {
    generation: u64,
    segments: Vec<SegmentCommitInfo>,
    user_data: BTreeMap<String, String>,
}

impl IndexCommit {
    /// Generation of the latest commit in `directory`, if any
    pub fn latest_generation(directory: &Directory) -> IndexResult<Option<u64>> {
        Ok(directory
            .list_all()?
            .iter()
            .filter_map(|name| generation_from_segments_file(name))
            .max())
    }

    /// All commit generations present in `directory`, ascending
    pub fn list_generations(directory: &Directory) -> IndexResult<Vec<u64>> {
        let mut generations: Vec<u64> = directory
            .list_all()?
            .iter()
            .filter_map(|name| generation_from_segments_file(name))
            .collect();
        generations.sort_unstable();
        Ok(generations)
    }

    /// Read the latest commit in `directory`
    ///
    /// A writer may prune the commit between listing and reading it; in that
    /// case the listing is retried as long as a newer generation shows up.
    pub fn read_latest(directory: &Directory) -> IndexResult<Self> {
        let mut last_seen = None;
        loop {
            let generation = match Self::latest_generation(directory)? {
                Some(generation) => generation,
                None => return Err(IndexError::IndexNotFound(directory.path().to_path_buf())),
            };
            match Self::read(directory, generation) {
                Err(IndexError::Io(e))
                    if e.kind() == std::io::ErrorKind::NotFound
                        && last_seen.map_or(true, |seen| generation > seen) =>
                {
                    last_seen = Some(generation);
                }
                result => return result,
            }
        }
    }

    /// Read the commit with the given generation
    pub fn read(directory: &Directory, generation: u64) -> IndexResult<Self> {
        let file = segments_file_name(generation);
        let bytes = directory.read(&file)?;
        let data: CommitData = framing::decode(COMMIT_MAGIC, COMMIT_FILE_VERSION, &file, &bytes)?;
        if data.generation != generation {
            return Err(IndexError::corruption(
                &file,
                format!("generation mismatch: file says {}", data.generation),
            ));
        }
        Ok(IndexCommit {
            generation: data.generation,
            segments: data.segments,
            user_data: data.user_data,
        })
    }

    /// Write a new commit point
    ///
    /// Normally called by `IndexWriter`; no check is made that `segments`
    /// matches the segment files on disk.
    pub fn write(
        directory: &Directory,
        generation: u64,
        segments: Vec<SegmentCommitInfo>,
        user_data: BTreeMap<String, String>,
    ) -> IndexResult<Self> {
        let file = segments_file_name(generation);
        let data = CommitData {
            generation,
            segments,
            user_data,
        };
        let bytes = framing::encode(COMMIT_MAGIC, COMMIT_FILE_VERSION, &file, &data)?;
        directory.write_atomic(&file, &bytes)?;
        Ok(IndexCommit {
            generation: data.generation,
            segments: data.segments,
            user_data: data.user_data,
        })
    }

    /// Commit generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Name of this commit's file
    pub fn segments_file_name(&self) -> String {
        segments_file_name(self.generation)
    }

    /// Segments in this commit
    pub fn segments(&self) -> &[SegmentCommitInfo] {
        &self.segments
    }

    /// Number of segments in this commit
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Opaque user data stored with the commit
    pub fn user_data(&self) -> &BTreeMap<String, String> {
        &self.user_data
    }

    /// Every file this commit references, its own file included
    pub fn file_names(&self) -> Vec<String> {
        let mut files: Vec<String> = self.segments.iter().map(|s| s.file_name()).collect();
        files.push(self.segments_file_name());
        files
    }
}
