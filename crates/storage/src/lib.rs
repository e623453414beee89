//! Storage layer for shadow replicas
//!
//! This crate implements the on-disk index a shard reads from:
//! - Directory: flat file namespace with atomic writes
//! - Segments: immutable document files plus per-commit deletions
//! - Commit points: `segments_<gen>` files naming the live segments
//! - DirectoryReader: point-in-time read view over one commit point
//! - SearcherManager: hands out and refreshes read views
//! - Store: reference-counted handle with corruption markers
//! - SnapshotDeletionPolicy: pins commit points for recovery
//!
//! The `IndexWriter` runs on the primary. A shadow replica never writes;
//! it only observes commit points the primary leaves in a shared directory.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accounting;
pub mod commit;
pub mod directory;
mod framing;
pub mod manager;
pub mod reader;
pub mod segment;
pub mod snapshot;
pub mod store;
pub mod writer;

pub use accounting::{Accountable, RamTree};
pub use commit::{segments_file_name, IndexCommit, SEGMENTS_PREFIX};
pub use directory::Directory;
pub use manager::{DirectoryReaderProvider, ReadViewProvider, SearcherManager, ViewManager};
pub use reader::DirectoryReader;
pub use segment::{
    generation_from_name, segment_name, Document, SegmentCommitInfo, SegmentReader,
    SEGMENT_EXTENSION, SEGMENT_FORMAT_VERSION,
};
pub use snapshot::{SnapshotDeletionPolicy, SnapshotIndexCommit};
pub use store::{Store, CORRUPTED_MARKER_PREFIX};
pub use writer::IndexWriter;
