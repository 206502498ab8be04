//! Matching and alignment
//!
//! Two stages with a deliberate split: the matcher collects *all* raw
//! digest coincidences between a query and the store, with no filtering or
//! scoring; the aligner then runs offset-histogram consensus over them. A
//! true match shares one constant frame delta between query and source (the
//! query is a time-shifted excerpt), while digest collisions scatter across
//! random deltas, so the correct alignment stands out as the largest
//! histogram bin.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::FingerprintConfig;
use crate::fingerprint::FingerprintHash;
use crate::store::{FingerprintStore, SourceId};
use crate::Result;

/// One digest shared between the query and a stored source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCandidate {
    /// Source the stored record belongs to
    pub source: SourceId,
    /// Anchor frame of the digest inside the query
    pub query_frame: u32,
    /// Anchor frame of the digest inside the source
    pub source_frame: u32,
}

/// The aligner's verdict for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentResult {
    /// Winning source id
    pub source: SourceId,
    /// Winning source name
    pub source_name: String,
    /// Estimated start position of the query within the source, in seconds
    pub offset_seconds: f64,
    /// Number of candidates supporting the winning offset bin
    pub confidence: usize,
}

/// Outcome of one recognition decision.
///
/// `NoMatch` is a legitimate terminal outcome, distinct from any error: it
/// means no candidate evidence existed at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    /// A best-aligned source was found
    Match(AlignmentResult),
    /// No digest overlap between query and corpus
    NoMatch,
}

/// Collect every store record whose digest appears in the query hash set.
///
/// Emits one candidate per (query anchor, store record) pair sharing a
/// digest. An empty query or zero overlap yields an empty list, not an
/// error.
pub fn match_candidates(
    store: &dyn FingerprintStore,
    hashes: &[FingerprintHash],
) -> Result<Vec<MatchCandidate>> {
    if hashes.is_empty() {
        return Ok(Vec::new());
    }

    // a digest can anchor at several query frames; keep them all
    let mut query_frames: HashMap<u64, Vec<u32>> = HashMap::new();
    for hash in hashes {
        query_frames.entry(hash.digest).or_default().push(hash.time_offset);
    }

    let digests: Vec<u64> = query_frames.keys().copied().collect();
    let records = store.lookup(&digests)?;

    let mut candidates = Vec::with_capacity(records.len());
    for record in &records {
        if let Some(frames) = query_frames.get(&record.digest) {
            for &query_frame in frames {
                candidates.push(MatchCandidate {
                    source: record.source,
                    query_frame,
                    source_frame: record.time_offset,
                });
            }
        }
    }

    debug!(
        query_hashes = hashes.len(),
        records = records.len(),
        candidates = candidates.len(),
        "matched query against store"
    );
    Ok(candidates)
}

/// Offset-histogram consensus over raw candidates.
///
/// Groups candidates by `(source, source_frame - query_frame)` and picks the
/// largest group. Ties across sources resolve to the lowest source id; ties
/// across deltas within one source resolve to the smallest delta, so the
/// verdict is stable across runs.
pub fn align(
    candidates: &[MatchCandidate],
    store: &dyn FingerprintStore,
    config: &FingerprintConfig,
) -> Result<RecognitionOutcome> {
    if candidates.is_empty() {
        return Ok(RecognitionOutcome::NoMatch);
    }

    let mut histogram: HashMap<(SourceId, i64), usize> = HashMap::new();
    for candidate in candidates {
        let delta = candidate.source_frame as i64 - candidate.query_frame as i64;
        *histogram.entry((candidate.source, delta)).or_default() += 1;
    }

    // winner: largest bin, then lowest source id, then smallest delta
    let (&(source, delta), &confidence) = histogram
        .iter()
        .min_by(|a, b| {
            b.1.cmp(a.1)
                .then_with(|| a.0 .0.cmp(&b.0 .0))
                .then_with(|| a.0 .1.cmp(&b.0 .1))
        })
        .expect("histogram is non-empty");

    let source_name = store.get_source(source)?.name;
    debug!(%source, delta, confidence, "alignment consensus");

    Ok(RecognitionOutcome::Match(AlignmentResult {
        source,
        source_name,
        offset_seconds: config.frame_to_seconds(delta),
        confidence,
    }))
}
