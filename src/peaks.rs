//! Spectral peak extraction
//!
//! Finds landmark points in a spectrogram: cells that exceed the amplitude
//! threshold and dominate a rectangular neighborhood in both frequency and
//! time. Peaks are the noise-robust features everything downstream is built
//! on; magnitudes themselves are discarded after this stage.

use crate::config::FingerprintConfig;
use crate::spectrogram::Spectrogram;

/// A locally dominant time-frequency point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Frequency bin index
    pub freq_bin: u32,
    /// Time frame index
    pub frame: u32,
    /// Magnitude in dB
    pub magnitude: f32,
}

/// Extract all peaks from a spectrogram, ordered by (frame, freq_bin).
///
/// A cell is a peak iff its magnitude is at least `amp_min_db` and it is the
/// maximum within `peak_neighborhood` bins/frames in every direction. Exact
/// magnitude ties inside one neighborhood are broken by canonical scan order
/// (lowest frequency bin first, then earliest frame), so extraction is
/// reproducible across runs on identical input.
pub fn extract_peaks(spectrogram: &Spectrogram, config: &FingerprintConfig) -> Vec<Peak> {
    let frames = spectrogram.frames();
    let num_frames = frames.len();
    let num_bins = spectrogram.num_bins();
    let radius = config.peak_neighborhood as isize;

    let mut peaks = Vec::new();

    for t in 0..num_frames {
        for f in 0..num_bins {
            let value = frames[t][f];
            if value < config.amp_min_db {
                continue;
            }
            if dominates_neighborhood(frames, num_frames, num_bins, t, f, value, radius) {
                peaks.push(Peak {
                    freq_bin: f as u32,
                    frame: t as u32,
                    magnitude: value,
                });
            }
        }
    }

    peaks
}

/// True when `(t, f)` wins against every other cell in its neighborhood.
///
/// A strictly larger neighbor always disqualifies the cell; an equal-valued
/// neighbor disqualifies it only if that neighbor comes first in scan order.
fn dominates_neighborhood(
    frames: &[Vec<f32>],
    num_frames: usize,
    num_bins: usize,
    t: usize,
    f: usize,
    value: f32,
    radius: isize,
) -> bool {
    let t_lo = (t as isize - radius).max(0) as usize;
    let t_hi = (t as isize + radius).min(num_frames as isize - 1) as usize;
    let f_lo = (f as isize - radius).max(0) as usize;
    let f_hi = (f as isize + radius).min(num_bins as isize - 1) as usize;

    for nt in t_lo..=t_hi {
        for nf in f_lo..=f_hi {
            if nt == t && nf == f {
                continue;
            }
            let neighbor = frames[nt][nf];
            if neighbor > value {
                return false;
            }
            if neighbor == value && (nf, nt) < (f, t) {
                return false;
            }
        }
    }
    true
}
