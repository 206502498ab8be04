//! Bulk indexing pipeline
//!
//! Applies decode → fingerprint → store across one file or a directory
//! tree. Directory runs fan the file list out over a bounded channel to a
//! fixed worker pool; each worker claims a source through the store's
//! duplicate check, so two workers can never double-index the same content.
//! One file failing to decode is recorded and reported, never fatal for the
//! batch.

use crossbeam_channel::bounded;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::decode::{decode_file, file_checksum, find_audio_files};
use crate::fingerprint::{fingerprint_channel, FingerprintHash};
use crate::store::{FingerprintStore, SourceId};
use crate::{Result, SoundprintError};

/// What happened to one file during indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    /// Fingerprinted and committed
    Indexed {
        /// Id assigned to the new source
        source: SourceId,
        /// Number of fingerprints committed
        fingerprints: usize,
    },
    /// Content was already in the store; nothing to do
    Skipped,
    /// Decode or store failure; siblings in the batch are unaffected
    Failed {
        /// Rendered error message
        error: String,
    },
}

/// Per-file result of a directory run.
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    /// File the status refers to
    pub path: PathBuf,
    /// What happened to it
    pub status: IndexStatus,
}

/// Orchestrates corpus indexing against a shared store.
pub struct Indexer {
    store: Arc<dyn FingerprintStore>,
    config: Config,
}

impl Indexer {
    /// Create an indexer writing to `store`.
    pub fn new(store: Arc<dyn FingerprintStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Index a single file.
    ///
    /// Already-known content returns `Ok(IndexStatus::Skipped)`; decode and
    /// store failures propagate as errors since there is no batch to
    /// shelter them in.
    pub fn index_file(&self, path: &Path) -> Result<IndexStatus> {
        self.config.fingerprint.validate()?;
        let checksum = file_checksum(path)?;
        let name = source_name(path);

        // claim the source before the expensive decode; the duplicate check
        // is atomic at the store level
        let source = match self.store.add_source(&name, &checksum) {
            Ok(source) => source,
            Err(SoundprintError::DuplicateSource(_)) => {
                // a known checksum only counts as indexed once fingerprints
                // were committed; a claim left by a failed earlier attempt
                // is resumed instead of skipped
                let existing = self.store.source_by_checksum(&checksum)?;
                match existing {
                    Some(source) if self.store.fingerprint_count(source.id)? == 0 => {
                        info!(path = %path.display(), source = %source.id, "resuming interrupted indexing");
                        source.id
                    }
                    _ => {
                        info!(path = %path.display(), "already indexed, skipping");
                        return Ok(IndexStatus::Skipped);
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let decoded = decode_file(path, &self.config.fingerprint)?;

        // all channels contribute to the same source; identical hashes from
        // different channels collapse
        let mut seen: HashSet<FingerprintHash> = HashSet::new();
        let mut hashes: Vec<FingerprintHash> = Vec::new();
        for channel in &decoded.channels {
            for hash in fingerprint_channel(&channel.samples, &self.config.fingerprint) {
                if seen.insert(hash) {
                    hashes.push(hash);
                }
            }
        }

        self.store.insert_fingerprints(source, &hashes)?;
        info!(
            path = %path.display(),
            %source,
            fingerprints = hashes.len(),
            "indexed"
        );
        Ok(IndexStatus::Indexed {
            source,
            fingerprints: hashes.len(),
        })
    }

    /// Index every matching file under `root` using the configured worker
    /// pool.
    ///
    /// Returns one outcome per file, in completion order. Per-file failures
    /// appear as [`IndexStatus::Failed`] entries and never abort the run.
    pub fn index_directory(&self, root: &Path) -> Result<Vec<IndexOutcome>> {
        let files = find_audio_files(root, &self.config.indexer.extensions);
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.config.indexer.workers.max(1);
        let (path_tx, path_rx) = bounded::<PathBuf>(workers * 2);
        let (outcome_tx, outcome_rx) = bounded::<IndexOutcome>(workers * 2);
        let total = files.len();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let path_rx = path_rx.clone();
                let outcome_tx = outcome_tx.clone();
                scope.spawn(move || {
                    for path in path_rx.iter() {
                        let status = match self.index_file(&path) {
                            Ok(status) => status,
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "indexing failed");
                                IndexStatus::Failed {
                                    error: e.to_string(),
                                }
                            }
                        };
                        if outcome_tx.send(IndexOutcome { path, status }).is_err() {
                            break; // collector is gone, stop early
                        }
                    }
                });
            }
            drop(path_rx);
            drop(outcome_tx);

            scope.spawn(move || {
                for path in files {
                    if path_tx.send(path).is_err() {
                        break;
                    }
                }
            });

            let outcomes: Vec<IndexOutcome> = outcome_rx.iter().take(total).collect();
            Ok(outcomes)
        })
    }
}

/// Human-readable source name for a path: the file stem, as with dropping
/// the extension from a track filename.
fn source_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}
