//! Core types for the shadow replica engine
//!
//! - ShardId: (index name, shard number) pair identifying the shard an
//!   engine and its store belong to

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a single shard of an index
///
/// Displayed as `[index][id]`, the form used in every log line and error
/// message the engine produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    index: String,
    id: u32,
}

impl ShardId {
    /// Create a new shard id
    pub fn new(index: impl Into<String>, id: u32) -> Self {
        Self {
            index: index.into(),
            id,
        }
    }

    /// Name of the index this shard belongs to
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Shard number within the index
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.id)
    }
}
