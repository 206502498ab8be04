//! Landmark-based audio fingerprinting and recognition
//!
//! Identifies known recordings inside arbitrary, possibly noisy or
//! time-shifted audio clips. A corpus of recordings is reduced to a compact,
//! hash-indexed set of spectral landmarks; an unknown clip is reduced the
//! same way and matched against the corpus by offset-histogram consensus,
//! yielding the best source, the position of the clip inside it and a
//! confidence score.
//!
//! # Pipeline
//! - Spectrogram: windowed FFT magnitudes over one channel
//! - Peaks: strict local maxima above a noise floor
//! - Hashes: pairs of nearby peaks digested into compact index keys
//! - Store: `(digest, source, frame)` records behind the [`FingerprintStore`](store::FingerprintStore) trait
//! - Matching: exact digest lookup plus offset-histogram alignment
//!
//! # Crate feature flags
//! - `sqlite` (default): rusqlite-backed [`SqliteStore`](store::SqliteStore)
//!
//! # Quick start
//! ```no_run
//! use soundprint::config::Config;
//! use soundprint::indexer::Indexer;
//! use soundprint::recognizer::Recognizer;
//! use soundprint::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let store = Arc::new(MemoryStore::new());
//! let indexer = Indexer::new(store.clone(), config.clone());
//! indexer.index_file("corpus/song.mp3".as_ref()).unwrap();
//!
//! let recognizer = Recognizer::new(store, config);
//! let outcome = recognizer.recognize_file("clips/unknown.mp3".as_ref()).unwrap();
//! println!("{:?}", outcome);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod decode;
pub mod fingerprint;
pub mod indexer;
pub mod matching;
pub mod peaks;
pub mod recognizer;
pub mod spectrogram;
pub mod store;

/// Error types for fingerprinting and recognition operations
#[derive(thiserror::Error, Debug)]
pub enum SoundprintError {
    /// Source audio could not be decoded (unsupported or corrupt)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Content with the same checksum has already been indexed
    #[error("Duplicate source: {0}")]
    DuplicateSource(String),

    /// Fingerprint store backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fingerprinting and recognition operations
pub type Result<T> = std::result::Result<T, SoundprintError>;

// Public API exports
pub use config::Config;
pub use decode::{DecodedAudio, SampleBuffer};
pub use fingerprint::{fingerprint_channel, FingerprintHash};
pub use indexer::{IndexStatus, Indexer};
pub use matching::{align, match_candidates, AlignmentResult, MatchCandidate, RecognitionOutcome};
pub use peaks::Peak;
pub use recognizer::Recognizer;
pub use spectrogram::Spectrogram;
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{FingerprintStore, MemoryStore, Source, SourceId};
