//! In-memory reference store
//!
//! Keeps the whole corpus in a digest-keyed hash map behind a single
//! read-write lock. Reference implementation for the
//! [`FingerprintStore`] contract and the backend of choice for tests; a
//! realistic corpus belongs in [`SqliteStore`](super::SqliteStore).

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::{FingerprintRecord, FingerprintStore, Source, SourceId};
use crate::fingerprint::FingerprintHash;
use crate::{Result, SoundprintError};

#[derive(Default)]
struct Inner {
    sources: Vec<Source>,
    checksums: HashSet<String>,
    // digest -> postings; this is the index lookup() runs against
    index: HashMap<u64, Vec<(SourceId, u32)>>,
    counts: HashMap<SourceId, usize>,
}

/// Thread-safe in-memory fingerprint store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for MemoryStore {
    fn add_source(&self, name: &str, checksum: &str) -> Result<SourceId> {
        let mut inner = self.inner.write();
        if !inner.checksums.insert(checksum.to_string()) {
            return Err(SoundprintError::DuplicateSource(name.to_string()));
        }
        let id = SourceId(inner.sources.len() as i64 + 1);
        inner.sources.push(Source {
            id,
            name: name.to_string(),
            checksum: checksum.to_string(),
        });
        Ok(id)
    }

    fn insert_fingerprints(&self, source: SourceId, hashes: &[FingerprintHash]) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.counts.get(&source).copied().unwrap_or(0) > 0 {
            return Ok(());
        }
        for hash in hashes {
            inner
                .index
                .entry(hash.digest)
                .or_default()
                .push((source, hash.time_offset));
        }
        inner.counts.insert(source, hashes.len());
        Ok(())
    }

    fn lookup(&self, digests: &[u64]) -> Result<Vec<FingerprintRecord>> {
        let inner = self.inner.read();
        let unique: HashSet<u64> = digests.iter().copied().collect();
        let mut records = Vec::new();
        for digest in unique {
            if let Some(postings) = inner.index.get(&digest) {
                records.extend(postings.iter().map(|&(source, time_offset)| {
                    FingerprintRecord {
                        digest,
                        source,
                        time_offset,
                    }
                }));
            }
        }
        Ok(records)
    }

    fn source_by_checksum(&self, checksum: &str) -> Result<Option<Source>> {
        Ok(self
            .inner
            .read()
            .sources
            .iter()
            .find(|s| s.checksum == checksum)
            .cloned())
    }

    fn get_source(&self, id: SourceId) -> Result<Source> {
        self.inner
            .read()
            .sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| SoundprintError::Store(format!("unknown source id {id}")))
    }

    fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.inner.read().sources.clone())
    }

    fn fingerprint_count(&self, source: SourceId) -> Result<usize> {
        Ok(self.inner.read().counts.get(&source).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn hash(digest: u64, time_offset: u32) -> FingerprintHash {
        FingerprintHash {
            digest,
            time_offset,
        }
    }

    #[test]
    fn test_add_and_get_source() {
        let store = MemoryStore::new();
        let id = store.add_source("song", "ABC123").unwrap();
        let source = store.get_source(id).unwrap();
        assert_eq!(source.name, "song");
        assert_eq!(source.checksum, "ABC123");
        assert_eq!(store.list_sources().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_checksum_rejected() {
        let store = MemoryStore::new();
        store.add_source("song", "ABC123").unwrap();
        let err = store.add_source("copy-of-song", "ABC123").unwrap_err();
        assert!(matches!(err, SoundprintError::DuplicateSource(_)));
    }

    #[test]
    fn test_source_by_checksum() {
        let store = MemoryStore::new();
        let id = store.add_source("song", "ABC123").unwrap();
        let found = store.source_by_checksum("ABC123").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.name, "song");
        assert!(store.source_by_checksum("OTHER").unwrap().is_none());
    }

    #[test]
    fn test_unknown_source_id_is_store_error() {
        let store = MemoryStore::new();
        assert!(store.get_source(SourceId(42)).is_err());
    }

    #[test]
    fn test_insert_is_idempotent_per_source() {
        let store = MemoryStore::new();
        let id = store.add_source("song", "ABC").unwrap();
        store
            .insert_fingerprints(id, &[hash(1, 0), hash(2, 5)])
            .unwrap();
        assert_eq!(store.fingerprint_count(id).unwrap(), 2);

        // second insert is a no-op
        store
            .insert_fingerprints(id, &[hash(3, 9), hash(4, 11), hash(5, 13)])
            .unwrap();
        assert_eq!(store.fingerprint_count(id).unwrap(), 2);
        assert!(store.lookup(&[3]).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_spans_sources() {
        let store = MemoryStore::new();
        let a = store.add_source("a", "A").unwrap();
        let b = store.add_source("b", "B").unwrap();
        store
            .insert_fingerprints(a, &[hash(10, 1), hash(11, 2)])
            .unwrap();
        store
            .insert_fingerprints(b, &[hash(10, 7), hash(12, 8)])
            .unwrap();

        let mut records = store.lookup(&[10, 12, 99]).unwrap();
        records.sort_by_key(|r| (r.digest, r.source));
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], FingerprintRecord { digest: 10, source: a, time_offset: 1 });
        assert_eq!(records[1], FingerprintRecord { digest: 10, source: b, time_offset: 7 });
        assert_eq!(records[2], FingerprintRecord { digest: 12, source: b, time_offset: 8 });
    }

    #[test]
    fn test_empty_lookup() {
        let store = MemoryStore::new();
        assert!(store.lookup(&[]).unwrap().is_empty());
        assert!(store.lookup(&[7]).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_add_source_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.add_source(&format!("worker-{i}"), "SAME"))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert_eq!(store.list_sources().unwrap().len(), 1);
    }
}
