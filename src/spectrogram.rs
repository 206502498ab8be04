//! Spectrogram construction
//!
//! Converts one channel of PCM samples into a time-frequency magnitude
//! matrix: overlapping Hann-windowed frames, forward FFT, log-magnitude of
//! the first `n/2` bins. Frames are processed in parallel; output is
//! deterministic for identical samples and configuration.

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

use crate::config::FingerprintConfig;

/// Magnitude floor in linear scale, keeps the dB conversion finite.
const MAGNITUDE_FLOOR: f32 = 1e-10;

/// A time-frequency magnitude matrix for one audio channel.
///
/// Frame `i` covers samples `[i * hop_size, i * hop_size + window_size)`;
/// magnitudes are in dB relative to full scale.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    frames: Vec<Vec<f32>>,
}

impl Spectrogram {
    /// Build a spectrogram from signed 16-bit samples.
    ///
    /// A buffer shorter than one window yields a spectrogram with zero
    /// frames; callers treat that as "no fingerprints producible".
    pub fn build(samples: &[i16], config: &FingerprintConfig) -> Self {
        let window_size = config.window_size;
        let hop_size = config.hop_size;

        // a window below 2 samples cannot be Hann-weighted
        if window_size < 2 || samples.len() < window_size {
            return Self { frames: Vec::new() };
        }

        let window = hann_window(window_size);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);

        let num_frames = (samples.len() - window_size) / hop_size + 1;

        let frames = (0..num_frames)
            .into_par_iter()
            .map(|i| {
                let start = i * hop_size;
                let mut buffer: Vec<Complex<f32>> = samples[start..start + window_size]
                    .iter()
                    .zip(window.iter())
                    .map(|(&s, &w)| Complex {
                        re: s as f32 / 32_768.0 * w,
                        im: 0.0,
                    })
                    .collect();

                fft.process(&mut buffer);

                buffer[..window_size / 2]
                    .iter()
                    .map(|c| {
                        let magnitude = (c.re * c.re + c.im * c.im).sqrt();
                        20.0 * magnitude.max(MAGNITUDE_FLOOR).log10()
                    })
                    .collect()
            })
            .collect();

        Self { frames }
    }

    #[cfg(test)]
    pub(crate) fn from_frames(frames: Vec<Vec<f32>>) -> Self {
        Self { frames }
    }

    /// Magnitude rows, one per time frame.
    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    /// Number of time frames.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Number of frequency bins per frame (`window_size / 2`, 0 when empty).
    pub fn num_bins(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }

    /// True when the input was shorter than one analysis window.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1.0)).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> FingerprintConfig {
        FingerprintConfig {
            sample_rate: 8000,
            window_size: 512,
            hop_size: 256,
            ..FingerprintConfig::default()
        }
    }

    fn sine(freq: f32, seconds: f32, rate: u32) -> Vec<i16> {
        let count = (seconds * rate as f32) as usize;
        (0..count)
            .map(|i| {
                let t = i as f32 / rate as f32;
                ((2.0 * PI * freq * t).sin() * 12_000.0) as i16
            })
            .collect()
    }

    #[test]
    fn test_empty_input_yields_zero_frames() {
        let config = test_config();
        let spec = Spectrogram::build(&[], &config);
        assert!(spec.is_empty());
        assert_eq!(spec.num_bins(), 0);
    }

    #[test]
    fn test_sub_window_input_yields_zero_frames() {
        let config = test_config();
        let samples = vec![100i16; config.window_size - 1];
        assert!(Spectrogram::build(&samples, &config).is_empty());
    }

    #[test]
    fn test_degenerate_window_yields_zero_frames() {
        let config = FingerprintConfig {
            window_size: 1,
            hop_size: 1,
            ..test_config()
        };
        // no NaN frames out of a single-sample window
        assert!(Spectrogram::build(&[100i16; 64], &config).is_empty());
    }

    #[test]
    fn test_frame_count_and_bins() {
        let config = test_config();
        // exactly window + 3 hops of samples
        let samples = vec![0i16; config.window_size + 3 * config.hop_size];
        let spec = Spectrogram::build(&samples, &config);
        assert_eq!(spec.num_frames(), 4);
        assert_eq!(spec.num_bins(), config.window_size / 2);
    }

    #[test]
    fn test_deterministic_output() {
        let config = test_config();
        let samples = sine(440.0, 1.0, config.sample_rate);
        let a = Spectrogram::build(&samples, &config);
        let b = Spectrogram::build(&samples, &config);
        assert_eq!(a.frames(), b.frames());
    }

    #[test]
    fn test_tone_energy_lands_in_expected_bin() {
        let config = test_config();
        let freq = 1000.0;
        let samples = sine(freq, 1.0, config.sample_rate);
        let spec = Spectrogram::build(&samples, &config);

        let expected_bin =
            (freq * config.window_size as f32 / config.sample_rate as f32).round() as usize;
        let frame = &spec.frames()[spec.num_frames() / 2];
        let max_bin = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(bin, _)| bin)
            .unwrap();
        assert!((max_bin as i64 - expected_bin as i64).unsigned_abs() <= 1);
    }
}
