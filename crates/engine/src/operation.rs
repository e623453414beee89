//! Engine operation requests
//!
//! A read-only replica accepts every write request and discards it; these
//! types exist so shard-level callers can drive any engine kind through the
//! same surface.

use serde::{Deserialize, Serialize};
use shadow_storage::Document;

/// Create a document that must not exist yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Create {
    /// Document to create
    pub doc: Document,
}

impl Create {
    /// Create request for `doc`
    pub fn new(doc: Document) -> Self {
        Create { doc }
    }

    /// Document id
    pub fn id(&self) -> &str {
        &self.doc.id
    }
}

/// Index a document, replacing any live document with the same id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Document to index
    pub doc: Document,
}

impl Index {
    /// Index request for `doc`
    pub fn new(doc: Document) -> Self {
        Index { doc }
    }

    /// Document id
    pub fn id(&self) -> &str {
        &self.doc.id
    }
}

/// Delete a document by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delete {
    /// Id to delete
    pub id: String,
}

impl Delete {
    /// Delete request for `id`
    pub fn new(id: impl Into<String>) -> Self {
        Delete { id: id.into() }
    }
}

/// Delete every document matching a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteByQuery {
    /// Query body
    pub query: serde_json::Value,
}

impl DeleteByQuery {
    /// Delete-by-query request
    pub fn new(query: serde_json::Value) -> Self {
        DeleteByQuery { query }
    }
}

/// Options for `force_merge`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceMergeOptions {
    /// Block until the merge finishes
    pub flush: bool,
    /// Merge down to at most this many segments
    pub max_num_segments: Option<u32>,
    /// Only expunge deleted documents
    pub only_expunge_deletes: bool,
    /// Upgrade old segment formats
    pub upgrade: bool,
}

impl Default for ForceMergeOptions {
    fn default() -> Self {
        ForceMergeOptions {
            flush: true,
            max_num_segments: None,
            only_expunge_deletes: false,
            upgrade: false,
        }
    }
}

/// Real-time get by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Get {
    /// Id to look up
    pub id: String,
}

impl Get {
    /// Get request for `id`
    pub fn new(id: impl Into<String>) -> Self {
        Get { id: id.into() }
    }
}

/// Result of a get
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    /// The live document, if found
    pub document: Option<Document>,
    /// Commit generation of the view the lookup ran against
    pub generation: u64,
}

impl GetResult {
    /// True if a live document was found
    pub fn exists(&self) -> bool {
        self.document.is_some()
    }
}
