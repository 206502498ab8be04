//! Fingerprint generation
//!
//! Pairs nearby spectral peaks into compact, time-anchored hashes and wires
//! the full per-channel pipeline together (samples → spectrogram → peaks →
//! hashes). Pairing two peaks rather than hashing single ones makes each
//! digest discriminative enough that random cross-recording collisions are
//! rare, while the purely relative encoding survives additive noise and time
//! shifts.

use sha1::{Digest, Sha1};
use std::collections::HashSet;
use tracing::debug;

use crate::config::FingerprintConfig;
use crate::peaks::{extract_peaks, Peak};
use crate::spectrogram::Spectrogram;

/// One landmark hash: a truncated digest anchored at a spectrogram frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FingerprintHash {
    /// Truncated digest over `(anchor_freq, partner_freq, Δframe)`
    pub digest: u64,
    /// Frame index of the anchor peak
    pub time_offset: u32,
}

/// Run the full fingerprint pipeline on one channel of samples.
///
/// Every degenerate input (empty buffer, sub-window buffer, no peaks, no
/// pairs inside the target zone) degrades to an empty hash set, never an
/// error.
pub fn fingerprint_channel(samples: &[i16], config: &FingerprintConfig) -> Vec<FingerprintHash> {
    let spectrogram = Spectrogram::build(samples, config);
    let peaks = extract_peaks(&spectrogram, config);
    let hashes = generate_hashes(&peaks, config);
    debug!(
        frames = spectrogram.num_frames(),
        peaks = peaks.len(),
        hashes = hashes.len(),
        "fingerprinted channel"
    );
    hashes
}

/// Pair peaks within the target zone and emit one hash per pair.
///
/// `peaks` must be ordered by (frame, freq_bin), which is what
/// [`extract_peaks`] produces. For each anchor, subsequent peaks qualify as
/// partners when their frame distance lies in
/// `[min_time_delta, max_time_delta]` and their frequency deviation is at
/// most `freq_band_width` bins; at most `fan_out` partners are taken per
/// anchor. Identical `(digest, time_offset)` pairs collapse to one hash.
pub fn generate_hashes(peaks: &[Peak], config: &FingerprintConfig) -> Vec<FingerprintHash> {
    let mask = config.digest_mask();
    let mut seen: HashSet<FingerprintHash> = HashSet::new();
    let mut hashes = Vec::new();

    for (i, anchor) in peaks.iter().enumerate() {
        let mut partners = 0usize;

        for partner in peaks.iter().skip(i + 1) {
            let delta = partner.frame - anchor.frame;
            if delta > config.max_time_delta {
                break; // peaks are frame-ordered, nothing further qualifies
            }
            if delta < config.min_time_delta {
                continue;
            }
            if anchor.freq_bin.abs_diff(partner.freq_bin) > config.freq_band_width {
                continue;
            }

            let hash = FingerprintHash {
                digest: pair_digest(anchor.freq_bin, partner.freq_bin, delta) & mask,
                time_offset: anchor.frame,
            };
            if seen.insert(hash) {
                hashes.push(hash);
            }

            partners += 1;
            if partners >= config.fan_out {
                break;
            }
        }
    }

    hashes
}

/// Digest a peak pair into 64 bits.
///
/// First 8 bytes of SHA-1 over the little-endian encoding of
/// `(anchor_freq, partner_freq, Δframe)`. Deliberately far narrower than the
/// full 160-bit digest: collisions are expected and resolved at alignment,
/// and a `u64` keys the store index compactly.
fn pair_digest(anchor_freq: u32, partner_freq: u32, delta: u32) -> u64 {
    let mut hasher = Sha1::new();
    hasher.update(anchor_freq.to_le_bytes());
    hasher.update(partner_freq.to_le_bytes());
    hasher.update(delta.to_le_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("sha1 digest is 20 bytes"))
}
