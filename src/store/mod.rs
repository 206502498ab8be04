//! Fingerprint persistence
//!
//! The store is the only shared mutable resource in the engine. It is
//! modeled as a trait so the matcher and indexer stay backend-agnostic:
//! [`MemoryStore`] is the reference implementation used in tests,
//! [`SqliteStore`] (feature `sqlite`) persists corpora on disk. Any backend
//! must index records by digest, since recognition is one big exact-match
//! lookup over the query's digest set.

use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintHash;
use crate::Result;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Opaque identifier of an indexed recording.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceId(pub i64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An indexed recording: created once when first fingerprinted, never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Unique id assigned by the store
    pub id: SourceId,
    /// Human-readable name (typically the file stem)
    pub name: String,
    /// Whole-file content checksum, the identity used for duplicate detection
    pub checksum: String,
}

/// One stored `(digest, source, time_offset)` association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintRecord {
    /// Truncated landmark digest
    pub digest: u64,
    /// Recording the digest was extracted from
    pub source: SourceId,
    /// Anchor frame inside that recording
    pub time_offset: u32,
}

/// Storage backend contract for fingerprint corpora.
///
/// Implementations must tolerate concurrent calls for *different* sources;
/// `add_source` must reject a duplicate checksum atomically with respect to
/// concurrent workers racing on the same content.
pub trait FingerprintStore: Send + Sync {
    /// Register a new source, failing with
    /// [`SoundprintError::DuplicateSource`](crate::SoundprintError::DuplicateSource)
    /// if `checksum` is already known. This is what lets directory indexing
    /// skip previously processed files.
    fn add_source(&self, name: &str, checksum: &str) -> Result<SourceId>;

    /// Bulk-write fingerprints for a source. A no-op if the source already
    /// has fingerprints, so re-running an interrupted indexing pass is safe.
    fn insert_fingerprints(&self, source: SourceId, hashes: &[FingerprintHash]) -> Result<()>;

    /// Look up a source by content checksum, `None` if the content is
    /// unknown. Together with [`FingerprintStore::fingerprint_count`] this
    /// distinguishes fully indexed content from a source that was claimed
    /// but whose fingerprints were never committed.
    fn source_by_checksum(&self, checksum: &str) -> Result<Option<Source>>;

    /// Exact-match lookup: every stored record whose digest appears in
    /// `digests`. No fuzzy matching; robustness comes from alignment, not
    /// from the index.
    fn lookup(&self, digests: &[u64]) -> Result<Vec<FingerprintRecord>>;

    /// Fetch one source by id.
    fn get_source(&self, id: SourceId) -> Result<Source>;

    /// All indexed sources.
    fn list_sources(&self) -> Result<Vec<Source>>;

    /// Number of fingerprints stored for a source.
    fn fingerprint_count(&self, source: SourceId) -> Result<usize>;
}
