//! Tunable parameters for fingerprinting, indexing and recognition.
//!
//! Defaults follow the classic landmark-fingerprinting constants; every value
//! is a trade-off between recognition accuracy and index size, so all of them
//! can be overridden through a JSON config file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Result, SoundprintError};

/// Parameters of the fingerprint generation pipeline.
///
/// The same configuration must be used for indexing and recognition;
/// fingerprints produced under different parameters do not match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Analysis sampling rate in Hz; all input is resampled to this rate
    pub sample_rate: u32,
    /// FFT window size in samples
    pub window_size: usize,
    /// Frame stride in samples, must be smaller than `window_size`
    pub hop_size: usize,
    /// Minimum peak magnitude in dB
    pub amp_min_db: f32,
    /// Peak neighborhood radius in bins/frames; a cell is a peak only if it
    /// is the strict maximum within this radius in both axes
    pub peak_neighborhood: usize,
    /// Minimum frame distance between paired peaks
    pub min_time_delta: u32,
    /// Maximum frame distance between paired peaks
    pub max_time_delta: u32,
    /// Maximum frequency-bin deviation between paired peaks
    pub freq_band_width: u32,
    /// Maximum number of partner peaks per anchor
    pub fan_out: usize,
    /// Digest truncation width in bits (1..=64)
    pub digest_bits: u32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            window_size: 4096,
            hop_size: 2048,
            amp_min_db: 10.0,
            peak_neighborhood: 10,
            min_time_delta: 0,
            max_time_delta: 200,
            freq_band_width: 600,
            fan_out: 15,
            digest_bits: 64,
        }
    }
}

impl FingerprintConfig {
    /// Convert a spectrogram frame index to seconds.
    ///
    /// This is the single place where frame counts turn into wall-clock time;
    /// frame `i` covers the window starting at sample `i * hop_size`.
    pub fn frame_to_seconds(&self, frame: i64) -> f64 {
        frame as f64 * self.hop_size as f64 / self.sample_rate as f64
    }

    /// Convert a millisecond offset to a sample index at the analysis rate.
    pub fn millis_to_samples(&self, millis: u64) -> usize {
        (millis as u128 * self.sample_rate as u128 / 1000) as usize
    }

    /// Bit mask applied to the raw digest.
    pub fn digest_mask(&self) -> u64 {
        if self.digest_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.digest_bits) - 1
        }
    }

    /// Check parameter consistency.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(SoundprintError::Config(format!(
                "window_size must be >= 2, got {}",
                self.window_size
            )));
        }
        if self.hop_size == 0 || self.hop_size >= self.window_size {
            return Err(SoundprintError::Config(format!(
                "hop_size must be in 1..window_size ({}), got {}",
                self.window_size, self.hop_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(SoundprintError::Config("sample_rate must be non-zero".into()));
        }
        if self.digest_bits == 0 || self.digest_bits > 64 {
            return Err(SoundprintError::Config(format!(
                "digest_bits must be in 1..=64, got {}",
                self.digest_bits
            )));
        }
        if self.min_time_delta > self.max_time_delta {
            return Err(SoundprintError::Config(format!(
                "min_time_delta {} exceeds max_time_delta {}",
                self.min_time_delta, self.max_time_delta
            )));
        }
        if self.fan_out == 0 {
            return Err(SoundprintError::Config("fan_out must be non-zero".into()));
        }
        Ok(())
    }
}

/// Parameters of the bulk directory indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Worker pool size for directory indexing
    pub workers: usize,
    /// File extensions considered audio, without the leading dot
    pub extensions: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            extensions: vec!["mp3".into(), "wav".into(), "flac".into(), "ogg".into()],
        }
    }
}

/// Parameters of segmented recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Segment length in milliseconds
    pub segment_ms: u64,
    /// Offset into the query at which recognition starts, in milliseconds
    pub start_ms: u64,
    /// Cap on the total amount of audio examined, in milliseconds
    pub limit_ms: Option<u64>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            segment_ms: 10_000,
            start_ms: 0,
            limit_ms: None,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fingerprint pipeline parameters
    pub fingerprint: FingerprintConfig,
    /// Directory indexer parameters
    pub indexer: IndexerConfig,
    /// Segmented recognition parameters
    pub recognizer: RecognizerConfig,
}

impl Config {
    /// Load configuration from a JSON file; missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|e| SoundprintError::Config(format!("{}: {}", path.display(), e)))?;
        config.fingerprint.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.fingerprint.validate().is_ok());
        assert_eq!(config.fingerprint.window_size, 4096);
        assert_eq!(config.fingerprint.hop_size, 2048);
    }

    #[test]
    fn test_frame_to_seconds_conversion() {
        let config = FingerprintConfig::default();
        // hop 2048 at 44100 Hz: one frame advances 2048/44100 seconds
        assert_relative_eq!(config.frame_to_seconds(0), 0.0);
        assert_relative_eq!(config.frame_to_seconds(1), 2048.0 / 44_100.0);
        assert_relative_eq!(config.frame_to_seconds(100), 100.0 * 2048.0 / 44_100.0);
        // negative deltas (query starts before the source) convert the same way
        assert_relative_eq!(config.frame_to_seconds(-10), -10.0 * 2048.0 / 44_100.0);
    }

    #[test]
    fn test_millis_to_samples_conversion() {
        let config = FingerprintConfig::default();
        assert_eq!(config.millis_to_samples(0), 0);
        assert_eq!(config.millis_to_samples(1000), 44_100);
        assert_eq!(config.millis_to_samples(10_000), 441_000);
    }

    #[test]
    fn test_digest_mask_widths() {
        let mut config = FingerprintConfig::default();
        assert_eq!(config.digest_mask(), u64::MAX);
        config.digest_bits = 32;
        assert_eq!(config.digest_mask(), 0xFFFF_FFFF);
        config.digest_bits = 1;
        assert_eq!(config.digest_mask(), 1);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut config = FingerprintConfig::default();
        config.hop_size = config.window_size;
        assert!(config.validate().is_err());

        let mut config = FingerprintConfig::default();
        config.digest_bits = 65;
        assert!(config.validate().is_err());

        let mut config = FingerprintConfig::default();
        config.min_time_delta = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{ "fingerprint": { "sample_rate": 11025 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.fingerprint.sample_rate, 11_025);
        assert_eq!(config.fingerprint.window_size, 4096);
        assert_eq!(config.indexer.workers, 4);
    }
}
