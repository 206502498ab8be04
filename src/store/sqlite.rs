//! SQLite-backed fingerprint store
//!
//! Persists the corpus in a single database file: a `sources` table with a
//! unique checksum constraint (the duplicate-detection mechanism) and a
//! `hashes` table indexed by digest. Digests are stored as their `i64` bit
//! pattern since SQLite integers are signed.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

use super::{FingerprintRecord, FingerprintStore, Source, SourceId};
use crate::fingerprint::FingerprintHash;
use crate::{Result, SoundprintError};

/// Maximum digests per `IN (...)` clause during lookup.
const LOOKUP_CHUNK: usize = 500;

/// Fingerprint store backed by a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a transient in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS hashes (
                digest INTEGER NOT NULL,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                time_offset INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_hashes_digest ON hashes(digest);
            CREATE INDEX IF NOT EXISTS idx_hashes_source ON hashes(source_id);
            "#,
        )
        .map_err(store_err)?;
        Ok(())
    }
}

impl FingerprintStore for SqliteStore {
    fn add_source(&self, name: &str, checksum: &str) -> Result<SourceId> {
        let conn = self.conn.lock();
        match conn.execute(
            "INSERT INTO sources (name, checksum) VALUES (?1, ?2)",
            (name, checksum),
        ) {
            Ok(_) => Ok(SourceId(conn.last_insert_rowid())),
            Err(e) if is_constraint_violation(&e) => {
                Err(SoundprintError::DuplicateSource(name.to_string()))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    fn insert_fingerprints(&self, source: SourceId, hashes: &[FingerprintHash]) -> Result<()> {
        let mut conn = self.conn.lock();
        let existing: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM hashes WHERE source_id = ?1",
                [source.0],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        if existing > 0 {
            return Ok(());
        }

        let tx = conn.transaction().map_err(store_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO hashes (digest, source_id, time_offset) VALUES (?1, ?2, ?3)")
                .map_err(store_err)?;
            for hash in hashes {
                stmt.execute((hash.digest as i64, source.0, hash.time_offset as i64))
                    .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    fn lookup(&self, digests: &[u64]) -> Result<Vec<FingerprintRecord>> {
        let conn = self.conn.lock();
        let mut records = Vec::new();

        for chunk in digests.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT digest, source_id, time_offset FROM hashes WHERE digest IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql).map_err(store_err)?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(chunk.iter().map(|&d| d as i64)),
                    |row| {
                        Ok(FingerprintRecord {
                            digest: row.get::<_, i64>(0)? as u64,
                            source: SourceId(row.get(1)?),
                            time_offset: row.get::<_, i64>(2)? as u32,
                        })
                    },
                )
                .map_err(store_err)?;
            for row in rows {
                records.push(row.map_err(store_err)?);
            }
        }

        Ok(records)
    }

    fn source_by_checksum(&self, checksum: &str) -> Result<Option<Source>> {
        let conn = self.conn.lock();
        match conn.query_row(
            "SELECT id, name, checksum FROM sources WHERE checksum = ?1",
            [checksum],
            |row| {
                Ok(Source {
                    id: SourceId(row.get(0)?),
                    name: row.get(1)?,
                    checksum: row.get(2)?,
                })
            },
        ) {
            Ok(source) => Ok(Some(source)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(store_err(e)),
        }
    }

    fn get_source(&self, id: SourceId) -> Result<Source> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, checksum FROM sources WHERE id = ?1",
            [id.0],
            |row| {
                Ok(Source {
                    id: SourceId(row.get(0)?),
                    name: row.get(1)?,
                    checksum: row.get(2)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                SoundprintError::Store(format!("unknown source id {id}"))
            }
            other => store_err(other),
        })
    }

    fn list_sources(&self) -> Result<Vec<Source>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, name, checksum FROM sources ORDER BY id")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Source {
                    id: SourceId(row.get(0)?),
                    name: row.get(1)?,
                    checksum: row.get(2)?,
                })
            })
            .map_err(store_err)?;
        let mut sources = Vec::new();
        for row in rows {
            sources.push(row.map_err(store_err)?);
        }
        Ok(sources)
    }

    fn fingerprint_count(&self, source: SourceId) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM hashes WHERE source_id = ?1",
                [source.0],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(count as usize)
    }
}

fn store_err(e: rusqlite::Error) -> SoundprintError {
    SoundprintError::Store(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(digest: u64, time_offset: u32) -> FingerprintHash {
        FingerprintHash {
            digest,
            time_offset,
        }
    }

    #[test]
    fn test_schema_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.add_source("song", "ABC123").unwrap();
        store
            .insert_fingerprints(id, &[hash(1, 0), hash(u64::MAX, 7)])
            .unwrap();

        let source = store.get_source(id).unwrap();
        assert_eq!(source.name, "song");
        assert_eq!(store.fingerprint_count(id).unwrap(), 2);

        // u64 digests survive the signed round-trip
        let records = store.lookup(&[u64::MAX]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].digest, u64::MAX);
        assert_eq!(records[0].time_offset, 7);
    }

    #[test]
    fn test_duplicate_checksum_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_source("song", "ABC").unwrap();
        let err = store.add_source("other-name", "ABC").unwrap_err();
        assert!(matches!(err, SoundprintError::DuplicateSource(_)));
        assert_eq!(store.list_sources().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_is_idempotent_per_source() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.add_source("song", "ABC").unwrap();
        store.insert_fingerprints(id, &[hash(1, 0)]).unwrap();
        store
            .insert_fingerprints(id, &[hash(2, 1), hash(3, 2)])
            .unwrap();
        assert_eq!(store.fingerprint_count(id).unwrap(), 1);
    }

    #[test]
    fn test_source_by_checksum() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.add_source("song", "ABC123").unwrap();
        let found = store.source_by_checksum("ABC123").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.source_by_checksum("OTHER").unwrap().is_none());
    }

    #[test]
    fn test_unknown_source_id_is_store_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.get_source(SourceId(99)).unwrap_err();
        assert!(matches!(err, SoundprintError::Store(_)));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let id = store.add_source("song", "ABC").unwrap();
            store.insert_fingerprints(id, &[hash(42, 3)]).unwrap();
            id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_source(id).unwrap().name, "song");
        let records = store.lookup(&[42]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time_offset, 3);
    }
}
