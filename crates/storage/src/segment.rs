//! Immutable segments
//!
//! A segment is written once by the primary and never modified. Deletions
//! are not stored in the segment file; they live in the commit point as a
//! set of deleted document ordinals, so a new commit can delete documents
//! without rewriting the segment.
//!
//! Segment names are `_` followed by the base-36 generation (`_0`, `_1`, ...
//! `_a`, ...). The generation orders segments by creation time.
//!
//! ## File Format (`<name>.seg`)
//!
//! Framed (see `framing`) with magic `SSEG`; the payload holds the segment
//! name, format version, compound flag and the documents in ordinal order.

use crate::accounting::{Accountable, RamTree};
use crate::directory::Directory;
use crate::framing;
use serde::{Deserialize, Serialize};
use shadow_core::{IndexError, IndexResult};
use std::collections::{BTreeSet, HashMap};
use std::mem::size_of;
use std::sync::Arc;

/// Magic bytes for segment files
const SEGMENT_MAGIC: &[u8; 4] = b"SSEG";
/// Current segment file version
const SEGMENT_FILE_VERSION: u32 = 1;
/// Version string reported for segments written by this library
pub const SEGMENT_FORMAT_VERSION: &str = "1.0.0";
/// Segment file extension
pub const SEGMENT_EXTENSION: &str = "seg";

// ============================================================================
// Naming
// ============================================================================

/// Segment name for a generation (`_` + base 36)
pub fn segment_name(generation: u64) -> String {
    format!("_{}", to_base36(generation))
}

/// Generation encoded in a segment name, if the name is well formed
pub fn generation_from_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix('_')?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 36).ok()
}

pub(crate) fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

// ============================================================================
// Documents and segment metadata
// ============================================================================

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique among live documents
    pub id: String,
    /// Document body
    pub source: serde_json::Value,
}

impl Document {
    /// Create a document
    pub fn new(id: impl Into<String>, source: serde_json::Value) -> Self {
        Document {
            id: id.into(),
            source,
        }
    }

    fn estimated_bytes(&self) -> u64 {
        (size_of::<Document>() + self.id.len()) as u64 + value_bytes(&self.source)
    }
}

fn value_bytes(value: &serde_json::Value) -> u64 {
    use serde_json::Value;
    let base = size_of::<Value>() as u64;
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => base,
        Value::String(s) => base + s.len() as u64,
        Value::Array(items) => base + items.iter().map(value_bytes).sum::<u64>(),
        Value::Object(map) => {
            base + map
                .iter()
                .map(|(k, v)| k.len() as u64 + value_bytes(v))
                .sum::<u64>()
        }
    }
}

/// Per-segment entry of a commit point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCommitInfo {
    /// Segment name (`_<gen>`)
    pub name: String,
    /// Documents in the segment file, deleted ones included
    pub max_doc: u32,
    /// Ordinals deleted as of this commit
    pub deleted: BTreeSet<u32>,
    /// Format version the segment was written with
    pub version: String,
    /// Whether the segment is stored as a single compound file
    pub compound: bool,
}

impl SegmentCommitInfo {
    /// Name of the segment file
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, SEGMENT_EXTENSION)
    }

    /// Generation parsed from the name
    pub fn generation(&self) -> Option<u64> {
        generation_from_name(&self.name)
    }

    /// Number of deleted documents
    pub fn del_count(&self) -> u32 {
        self.deleted.len() as u32
    }
}

#[derive(Serialize, Deserialize)]
struct SegmentData {
    name: String,
    version: String,
    compound: bool,
    docs: Vec<Document>,
}

/// Write a new segment file holding `docs`
pub(crate) fn write_segment(
    directory: &Directory,
    name: &str,
    docs: Vec<Document>,
) -> IndexResult<SegmentCommitInfo> {
    let max_doc = docs.len() as u32;
    let data = SegmentData {
        name: name.to_string(),
        version: SEGMENT_FORMAT_VERSION.to_string(),
        compound: true,
        docs,
    };
    let info = SegmentCommitInfo {
        name: name.to_string(),
        max_doc,
        deleted: BTreeSet::new(),
        version: data.version.clone(),
        compound: data.compound,
    };
    let file = info.file_name();
    let bytes = framing::encode(SEGMENT_MAGIC, SEGMENT_FILE_VERSION, &file, &data)?;
    directory.write_atomic(&file, &bytes)?;
    Ok(info)
}

// ============================================================================
// Loaded components
// ============================================================================

/// Id → ordinal lookup
struct PostingsIndex {
    ids: HashMap<String, u32>,
}

impl Accountable for PostingsIndex {
    fn ram_bytes_used(&self) -> u64 {
        self.ids
            .keys()
            .map(|k| (k.len() + size_of::<String>() + size_of::<u32>()) as u64)
            .sum()
    }
}

/// Documents in ordinal order
struct StoredFields {
    docs: Vec<Document>,
    bytes: u64,
}

impl Accountable for StoredFields {
    fn ram_bytes_used(&self) -> u64 {
        self.bytes
    }
}

// ============================================================================
// SegmentReader
// ============================================================================

/// A loaded segment as of one commit point
///
/// The loaded components are shared between readers of the same segment so
/// that reopening against a newer commit only replaces the deletions.
pub struct SegmentReader {
    info: SegmentCommitInfo,
    directory: Directory,
    postings: Arc<PostingsIndex>,
    stored: Arc<StoredFields>,
}

/// Deleted ordinals must all fall inside the segment
fn validate_deletions(info: &SegmentCommitInfo) -> IndexResult<()> {
    match info.deleted.iter().find(|&&ord| ord >= info.max_doc) {
        Some(&bad) => Err(IndexError::corruption(
            info.file_name(),
            format!("deleted ordinal {} out of range (max_doc {})", bad, info.max_doc),
        )),
        None => Ok(()),
    }
}

impl SegmentReader {
    /// Load the segment described by `info` from `directory`
    pub fn open(directory: &Directory, info: &SegmentCommitInfo) -> IndexResult<Self> {
        let file = info.file_name();
        let bytes = directory.read(&file)?;
        let data: SegmentData =
            framing::decode(SEGMENT_MAGIC, SEGMENT_FILE_VERSION, &file, &bytes)?;

        if data.name != info.name {
            return Err(IndexError::corruption(
                &file,
                format!("segment name mismatch: file has [{}]", data.name),
            ));
        }
        if data.docs.len() as u64 != u64::from(info.max_doc) {
            return Err(IndexError::corruption(
                &file,
                format!(
                    "doc count mismatch: commit says {} but file holds {}",
                    info.max_doc,
                    data.docs.len()
                ),
            ));
        }
        validate_deletions(info)?;

        let mut ids = HashMap::new();
        ids.try_reserve(data.docs.len())?;
        let mut bytes_used = 0u64;
        for (ord, doc) in data.docs.iter().enumerate() {
            ids.insert(doc.id.clone(), ord as u32);
            bytes_used += doc.estimated_bytes();
        }

        Ok(SegmentReader {
            info: info.clone(),
            directory: directory.clone(),
            postings: Arc::new(PostingsIndex { ids }),
            stored: Arc::new(StoredFields {
                docs: data.docs,
                bytes: bytes_used,
            }),
        })
    }

    /// Same segment with the deletions of a newer commit
    pub fn with_deletions(&self, info: &SegmentCommitInfo) -> IndexResult<Self> {
        if info.name != self.info.name || info.max_doc != self.info.max_doc {
            return Err(IndexError::InvalidState(format!(
                "cannot reopen segment [{}] as [{}]",
                self.info.name, info.name
            )));
        }
        validate_deletions(info)?;
        Ok(SegmentReader {
            info: info.clone(),
            directory: self.directory.clone(),
            postings: Arc::clone(&self.postings),
            stored: Arc::clone(&self.stored),
        })
    }

    /// Segment name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Commit metadata this reader was opened with
    pub fn info(&self) -> &SegmentCommitInfo {
        &self.info
    }

    /// Documents in the segment, deleted ones included
    pub fn max_doc(&self) -> u32 {
        self.info.max_doc
    }

    /// Live documents
    pub fn num_docs(&self) -> u32 {
        self.info.max_doc.saturating_sub(self.info.del_count())
    }

    /// Deleted documents
    pub fn num_deleted_docs(&self) -> u32 {
        self.info.del_count()
    }

    /// True if the ordinal is in range and not deleted
    pub fn is_live(&self, ord: u32) -> bool {
        ord < self.info.max_doc && !self.info.deleted.contains(&ord)
    }

    /// Live document at `ord`
    pub fn document(&self, ord: u32) -> Option<&Document> {
        if !self.is_live(ord) {
            return None;
        }
        self.stored.docs.get(ord as usize)
    }

    /// Ordinal of the document with this id, live or not
    pub fn ordinal(&self, id: &str) -> Option<u32> {
        self.postings.ids.get(id).copied()
    }

    /// Live document with this id
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.ordinal(id).and_then(|ord| self.document(ord))
    }

    /// Live documents in ordinal order
    pub fn live_documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.stored
            .docs
            .iter()
            .enumerate()
            .filter(move |(ord, _)| !self.info.deleted.contains(&(*ord as u32)))
            .map(|(_, doc)| doc)
    }

    /// On-disk size of the segment file
    pub fn size_in_bytes(&self) -> IndexResult<u64> {
        self.directory.file_length(&self.info.file_name())
    }

    /// Postings memory, if loaded
    pub fn postings(&self) -> Option<&dyn Accountable> {
        Some(self.postings.as_ref())
    }

    /// Stored fields memory, if loaded
    pub fn stored_fields(&self) -> Option<&dyn Accountable> {
        Some(self.stored.as_ref())
    }

    /// Term vectors are not written by this format
    pub fn term_vectors(&self) -> Option<&dyn Accountable> {
        None
    }

    /// Norms are not written by this format
    pub fn norms(&self) -> Option<&dyn Accountable> {
        None
    }

    /// Doc values are not written by this format
    pub fn doc_values(&self) -> Option<&dyn Accountable> {
        None
    }
}

impl Accountable for SegmentReader {
    fn ram_bytes_used(&self) -> u64 {
        let deletes = (self.info.deleted.len() * size_of::<u32>()) as u64;
        self.postings.ram_bytes_used() + self.stored.ram_bytes_used() + deletes
    }

    fn child_resources(&self) -> Vec<RamTree> {
        vec![
            RamTree::named("postings", self.postings.as_ref()),
            RamTree::named("stored fields", self.stored.as_ref()),
            RamTree::leaf(
                "live docs",
                (self.info.deleted.len() * size_of::<u32>()) as u64,
            ),
        ]
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("name", &self.info.name)
            .field("max_doc", &self.info.max_doc)
            .field("del_count", &self.info.del_count())
            .finish()
    }
}
