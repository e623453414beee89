//! Segment listings and memory statistics

use serde::Serialize;
use shadow_storage::{generation_from_name, Accountable, RamTree, SegmentReader};
use tracing::trace;

/// Summary of one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Segment name (`_<gen>`)
    pub name: String,
    /// Generation parsed from the name
    pub generation: u64,
    /// Part of the current read view
    pub search: bool,
    /// Part of a commit point
    pub committed: bool,
    /// Live documents
    pub doc_count: u32,
    /// Deleted documents
    pub del_doc_count: u32,
    /// On-disk size; absent if the file could not be measured
    pub size_in_bytes: Option<u64>,
    /// Heap held by the loaded segment
    pub memory_in_bytes: u64,
    /// Format version
    pub version: String,
    /// Stored as a compound file
    pub compound: bool,
    /// Memory breakdown, verbose listings only
    pub ram_tree: Option<RamTree>,
}

impl Segment {
    /// Summary of a loaded segment
    pub fn from_reader(reader: &SegmentReader, verbose: bool) -> Self {
        let info = reader.info();
        let size_in_bytes = match reader.size_in_bytes() {
            Ok(size) => Some(size),
            Err(e) => {
                trace!(target: "shadow::engine", segment = %info.name, error = %e, "failed to get size");
                None
            }
        };
        Segment {
            name: info.name.clone(),
            generation: generation_from_name(&info.name).unwrap_or(u64::MAX),
            search: true,
            committed: false,
            doc_count: reader.num_docs(),
            del_doc_count: reader.num_deleted_docs(),
            size_in_bytes,
            memory_in_bytes: reader.ram_bytes_used(),
            version: info.version.clone(),
            compound: info.compound,
            ram_tree: verbose.then(|| RamTree::named("root", reader)),
        }
    }
}

/// Sort segments ascending by generation
pub fn sort_by_generation(segments: &mut [Segment]) {
    segments.sort_by(|a, b| a.generation.cmp(&b.generation).then_with(|| a.name.cmp(&b.name)));
}

/// Memory statistics summed over every segment of a read view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentsStats {
    /// Number of segments
    pub count: u64,
    /// Heap held by all segments
    pub memory_in_bytes: u64,
    /// Heap held by postings
    pub terms_memory_in_bytes: u64,
    /// Heap held by stored fields
    pub stored_fields_memory_in_bytes: u64,
    /// Heap held by term vectors
    pub term_vectors_memory_in_bytes: u64,
    /// Heap held by norms
    pub norms_memory_in_bytes: u64,
    /// Heap held by doc values
    pub doc_values_memory_in_bytes: u64,
    /// Heap held by the version map
    pub version_map_memory_in_bytes: u64,
    /// Heap held by the write buffer
    pub index_writer_memory_in_bytes: u64,
    /// Write buffer ceiling
    pub index_writer_max_memory_in_bytes: u64,
}

impl SegmentsStats {
    /// Empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` segments holding `memory_in_bytes`
    pub fn add(&mut self, count: u64, memory_in_bytes: u64) {
        self.count += count;
        self.memory_in_bytes += memory_in_bytes;
    }

    /// Fold one loaded segment into the totals
    ///
    /// Components the segment does not carry contribute nothing.
    pub fn add_segment(&mut self, reader: &SegmentReader) {
        self.add(1, reader.ram_bytes_used());
        self.terms_memory_in_bytes += guarded_ram_bytes_used(reader.postings());
        self.stored_fields_memory_in_bytes += guarded_ram_bytes_used(reader.stored_fields());
        self.term_vectors_memory_in_bytes += guarded_ram_bytes_used(reader.term_vectors());
        self.norms_memory_in_bytes += guarded_ram_bytes_used(reader.norms());
        self.doc_values_memory_in_bytes += guarded_ram_bytes_used(reader.doc_values());
    }

    /// Add version map memory
    pub fn add_version_map_memory_in_bytes(&mut self, bytes: u64) {
        self.version_map_memory_in_bytes += bytes;
    }

    /// Add write buffer memory
    pub fn add_index_writer_memory_in_bytes(&mut self, bytes: u64) {
        self.index_writer_memory_in_bytes += bytes;
    }

    /// Add write buffer ceiling
    pub fn add_index_writer_max_memory_in_bytes(&mut self, bytes: u64) {
        self.index_writer_max_memory_in_bytes += bytes;
    }

    /// Add all totals from `other`
    pub fn merge(&mut self, other: &SegmentsStats) {
        self.add(other.count, other.memory_in_bytes);
        self.terms_memory_in_bytes += other.terms_memory_in_bytes;
        self.stored_fields_memory_in_bytes += other.stored_fields_memory_in_bytes;
        self.term_vectors_memory_in_bytes += other.term_vectors_memory_in_bytes;
        self.norms_memory_in_bytes += other.norms_memory_in_bytes;
        self.doc_values_memory_in_bytes += other.doc_values_memory_in_bytes;
        self.add_version_map_memory_in_bytes(other.version_map_memory_in_bytes);
        self.add_index_writer_memory_in_bytes(other.index_writer_memory_in_bytes);
        self.add_index_writer_max_memory_in_bytes(other.index_writer_max_memory_in_bytes);
    }
}

fn guarded_ram_bytes_used(component: Option<&dyn Accountable>) -> u64 {
    component.map_or(0, |c| c.ram_bytes_used())
}
