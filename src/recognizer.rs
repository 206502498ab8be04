//! Recognition orchestration
//!
//! Thin glue over the pipeline: decode a query, fingerprint it, run the
//! matcher and aligner against a store. Queries come in three shapes — a
//! whole file, fixed-length segments of a file, or successive buffers from
//! a live stream — unified behind the [`SegmentSource`] trait ("produce
//! successive sample-buffer sets with timing metadata"). Every segment is
//! an independent recognition decision; segment boundaries are never
//! merged.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::decode::{decode_file, DecodedAudio, SampleBuffer};
use crate::fingerprint::{fingerprint_channel, FingerprintHash};
use crate::matching::{align, match_candidates, RecognitionOutcome};
use crate::store::FingerprintStore;
use crate::{Result, SoundprintError};

/// One query slice: per-channel buffers plus where the slice started.
#[derive(Debug, Clone)]
pub struct Segment {
    /// One buffer per channel, all at the analysis rate
    pub channels: Vec<SampleBuffer>,
    /// Start of this slice within the query, in seconds
    pub start_seconds: f64,
}

/// Anything that can yield successive query segments in time order.
pub trait SegmentSource {
    /// Next segment, or `None` when the query is exhausted.
    fn next_segment(&mut self) -> Result<Option<Segment>>;
}

/// Recognition verdict for one segment of a query.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentResult {
    /// Segment start within the query, in seconds
    pub start_seconds: f64,
    /// The aligner's verdict for this segment
    #[serde(flatten)]
    pub outcome: RecognitionOutcome,
}

/// Runs recognition queries against a fingerprint store.
pub struct Recognizer {
    store: Arc<dyn FingerprintStore>,
    config: Config,
}

impl Recognizer {
    /// Create a recognizer reading from `store`.
    pub fn new(store: Arc<dyn FingerprintStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Recognize a whole file as a single decision.
    pub fn recognize_file(&self, path: &Path) -> Result<RecognitionOutcome> {
        let decoded = decode_file(path, &self.config.fingerprint)?;
        let outcome = self.recognize_buffers(&decoded.channels)?;
        info!(path = %path.display(), ?outcome, "whole-file recognition");
        Ok(outcome)
    }

    /// Recognize a file in fixed-length segments per the configured
    /// [`RecognizerConfig`](crate::config::RecognizerConfig).
    ///
    /// Results come back in segment order, one independent verdict per
    /// segment.
    pub fn recognize_file_segments(&self, path: &Path) -> Result<Vec<SegmentResult>> {
        let source = FileSource::open(path, &self.config)?;
        self.recognize_source(source)
    }

    /// Drive any segment source to exhaustion, one verdict per segment.
    pub fn recognize_source<S: SegmentSource>(&self, mut source: S) -> Result<Vec<SegmentResult>> {
        let mut results = Vec::new();
        while let Some(segment) = source.next_segment()? {
            let outcome = self.recognize_buffers(&segment.channels)?;
            results.push(SegmentResult {
                start_seconds: segment.start_seconds,
                outcome,
            });
        }
        Ok(results)
    }

    /// One recognition decision over a set of channel buffers.
    pub fn recognize_buffers(&self, channels: &[SampleBuffer]) -> Result<RecognitionOutcome> {
        self.config.fingerprint.validate()?;
        for channel in channels {
            if channel.sample_rate != self.config.fingerprint.sample_rate {
                return Err(SoundprintError::Config(format!(
                    "query sample rate {} does not match analysis rate {}",
                    channel.sample_rate, self.config.fingerprint.sample_rate
                )));
            }
        }

        let mut seen: HashSet<FingerprintHash> = HashSet::new();
        let mut hashes: Vec<FingerprintHash> = Vec::new();
        for channel in channels {
            for hash in fingerprint_channel(&channel.samples, &self.config.fingerprint) {
                if seen.insert(hash) {
                    hashes.push(hash);
                }
            }
        }

        let candidates = match_candidates(self.store.as_ref(), &hashes)?;
        align(&candidates, self.store.as_ref(), &self.config.fingerprint)
    }
}

/// Segments sliced out of a fully decoded file.
///
/// The file is decoded once; segments are views into the decoded buffers,
/// honoring the configured segment length, start offset and duration cap.
pub struct FileSource {
    decoded: DecodedAudio,
    segment_samples: usize,
    position: usize,
    end: usize,
}

impl FileSource {
    /// Decode `path` and prepare segment iteration per `config.recognizer`.
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let decoded = decode_file(path, &config.fingerprint)?;
        let total = decoded
            .channels
            .iter()
            .map(|c| c.samples.len())
            .min()
            .unwrap_or(0);

        let options = &config.recognizer;
        let start = config.fingerprint.millis_to_samples(options.start_ms).min(total);
        let end = match options.limit_ms {
            Some(limit) => (start + config.fingerprint.millis_to_samples(limit)).min(total),
            None => total,
        };
        let segment_samples = config.fingerprint.millis_to_samples(options.segment_ms).max(1);

        Ok(Self {
            decoded,
            segment_samples,
            position: start,
            end,
        })
    }
}

impl SegmentSource for FileSource {
    fn next_segment(&mut self) -> Result<Option<Segment>> {
        if self.position >= self.end {
            return Ok(None);
        }
        let start = self.position;
        let stop = (start + self.segment_samples).min(self.end);
        self.position = stop;

        let channels = self
            .decoded
            .channels
            .iter()
            .map(|channel| SampleBuffer {
                samples: channel.samples[start..stop].to_vec(),
                sample_rate: channel.sample_rate,
            })
            .collect();

        Ok(Some(Segment {
            channels,
            start_seconds: start as f64 / self.decoded.sample_rate as f64,
        }))
    }
}

/// Segments assembled from interleaved capture chunks.
///
/// The capture collaborator (microphone or any live feed) pushes
/// fixed-size interleaved chunks at the analysis rate; once the feed is
/// closed, the buffered audio is served as fixed-length segments exactly
/// like a decoded file.
pub struct StreamSource {
    channels: Vec<Vec<i16>>,
    sample_rate: u32,
    segment_samples: usize,
    position: usize,
    // interleave cursor, carried across chunks so a chunk boundary may
    // fall mid-frame
    next_channel: usize,
    closed: bool,
}

impl StreamSource {
    /// Create a stream assembly point for `num_channels` interleaved
    /// channels at `sample_rate` (which must equal the analysis rate of the
    /// recognizer this source is fed into).
    pub fn new(num_channels: usize, sample_rate: u32, segment_samples: usize) -> Self {
        Self {
            channels: vec![Vec::new(); num_channels.max(1)],
            sample_rate,
            segment_samples: segment_samples.max(1),
            position: 0,
            next_channel: 0,
            closed: false,
        }
    }

    /// Append one interleaved capture chunk. Chunks need not be
    /// frame-aligned; interleaving continues where the previous chunk
    /// stopped.
    pub fn push_chunk(&mut self, interleaved: &[i16]) {
        let num_channels = self.channels.len();
        for &sample in interleaved {
            self.channels[self.next_channel].push(sample);
            self.next_channel = (self.next_channel + 1) % num_channels;
        }
    }

    /// Mark the feed complete; remaining audio becomes the final segment.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn buffered(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }
}

impl SegmentSource for StreamSource {
    fn next_segment(&mut self) -> Result<Option<Segment>> {
        let available = self.buffered() - self.position.min(self.buffered());
        let ready = available >= self.segment_samples || (self.closed && available > 0);
        if !ready {
            return Ok(None);
        }

        let start = self.position;
        let stop = start + available.min(self.segment_samples);
        self.position = stop;

        let channels = self
            .channels
            .iter()
            .map(|samples| SampleBuffer {
                samples: samples[start..stop].to_vec(),
                sample_rate: self.sample_rate,
            })
            .collect();

        Ok(Some(Segment {
            channels,
            start_seconds: start as f64 / self.sample_rate as f64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stream_source_segmentation() {
        // stereo interleaved, segment of 4 samples per channel
        let mut source = StreamSource::new(2, 8000, 4);
        source.push_chunk(&[1, -1, 2, -2, 3, -3]);
        // only 3 samples per channel buffered, not enough for a segment
        assert!(source.next_segment().unwrap().is_none());

        source.push_chunk(&[4, -4, 5, -5]);
        let segment = source.next_segment().unwrap().unwrap();
        assert_eq!(segment.channels.len(), 2);
        assert_eq!(segment.channels[0].samples, vec![1, 2, 3, 4]);
        assert_eq!(segment.channels[1].samples, vec![-1, -2, -3, -4]);
        assert_relative_eq!(segment.start_seconds, 0.0);

        // remainder only comes out after close
        assert!(source.next_segment().unwrap().is_none());
        source.close();
        let tail = source.next_segment().unwrap().unwrap();
        assert_eq!(tail.channels[0].samples, vec![5]);
        assert_relative_eq!(tail.start_seconds, 4.0 / 8000.0);
        assert!(source.next_segment().unwrap().is_none());
    }

    #[test]
    fn test_stream_source_unaligned_chunks() {
        // chunk boundaries fall mid-frame; interleaving must not rotate
        let mut source = StreamSource::new(2, 8000, 3);
        source.push_chunk(&[1, -1, 2]);
        source.push_chunk(&[-2, 3]);
        source.push_chunk(&[-3]);
        source.close();

        let segment = source.next_segment().unwrap().unwrap();
        assert_eq!(segment.channels[0].samples, vec![1, 2, 3]);
        assert_eq!(segment.channels[1].samples, vec![-1, -2, -3]);
    }

    #[test]
    fn test_stream_source_timing_metadata() {
        let mut source = StreamSource::new(1, 1000, 250);
        source.push_chunk(&vec![0i16; 1000]);
        source.close();

        let mut starts = Vec::new();
        while let Some(segment) = source.next_segment().unwrap() {
            starts.push(segment.start_seconds);
        }
        assert_eq!(starts, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_invalid_window_is_config_error() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let mut config = Config::default();
        config.fingerprint.window_size = 1;
        config.fingerprint.hop_size = 1;
        let recognizer = Recognizer::new(store, config);

        let buffer = SampleBuffer {
            samples: vec![0; 1000],
            sample_rate: 44_100,
        };
        let err = recognizer.recognize_buffers(&[buffer]).unwrap_err();
        assert!(matches!(err, SoundprintError::Config(_)));
    }

    #[test]
    fn test_rate_mismatch_is_config_error() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let recognizer = Recognizer::new(store, Config::default());

        let buffer = SampleBuffer {
            samples: vec![0; 1000],
            sample_rate: 8000, // config default is 44100
        };
        let err = recognizer.recognize_buffers(&[buffer]).unwrap_err();
        assert!(matches!(err, SoundprintError::Config(_)));
    }

    #[test]
    fn test_empty_buffers_are_no_match() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let recognizer = Recognizer::new(store, Config::default());

        let outcome = recognizer.recognize_buffers(&[]).unwrap();
        assert_eq!(outcome, RecognitionOutcome::NoMatch);

        let silence = SampleBuffer {
            samples: vec![0; 100], // shorter than one window
            sample_rate: 44_100,
        };
        let outcome = recognizer.recognize_buffers(&[silence]).unwrap();
        assert_eq!(outcome, RecognitionOutcome::NoMatch);
    }
}
