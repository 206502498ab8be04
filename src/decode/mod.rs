//! Audio decoding collaborator
//!
//! Turns a media file into per-channel 16-bit sample buffers at the
//! configured analysis rate, plus a whole-file SHA-1 checksum that serves as
//! the content identity for duplicate detection. Container and codec
//! handling is entirely symphonia's job; resampling is rubato's. Nothing
//! downstream ever sees a file format.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, WindowFunction};
use sha1::{Digest, Sha1};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer as SymphoniaBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::FingerprintConfig;
use crate::{Result, SoundprintError};

/// Resampler input chunk size in frames.
const RESAMPLE_CHUNK: usize = 1024;

/// One channel of signed 16-bit samples at a known rate.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Amplitude samples
    pub samples: Vec<i16>,
    /// Sampling rate in Hz
    pub sample_rate: u32,
}

/// A fully decoded media file, ready for fingerprinting.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// One buffer per channel, all at [`DecodedAudio::sample_rate`]
    pub channels: Vec<SampleBuffer>,
    /// Common sampling rate of all channels (the analysis rate)
    pub sample_rate: u32,
    /// Uppercase hex SHA-1 of the raw file bytes
    pub checksum: String,
}

impl DecodedAudio {
    /// Duration of the longest channel in seconds.
    pub fn duration_seconds(&self) -> f64 {
        let samples = self
            .channels
            .iter()
            .map(|c| c.samples.len())
            .max()
            .unwrap_or(0);
        samples as f64 / self.sample_rate as f64
    }
}

/// Decode a media file into per-channel buffers at the analysis rate.
pub fn decode_file(path: &Path, config: &FingerprintConfig) -> Result<DecodedAudio> {
    let bytes = std::fs::read(path)?;
    let checksum = checksum_bytes(&bytes);

    let (interleaved, source_rate, num_channels) = decode_bytes(bytes, path)?;
    debug!(
        path = %path.display(),
        samples = interleaved.len(),
        channels = num_channels,
        rate = source_rate,
        "decoded file"
    );

    let mut channels = Vec::with_capacity(num_channels);
    for channel in 0..num_channels {
        let deinterleaved: Vec<f32> = interleaved
            .iter()
            .skip(channel)
            .step_by(num_channels)
            .copied()
            .collect();
        let resampled = resample(&deinterleaved, source_rate, config.sample_rate)?;
        channels.push(SampleBuffer {
            samples: resampled
                .iter()
                .map(|&v| (v * 32_767.0).clamp(-32_768.0, 32_767.0) as i16)
                .collect(),
            sample_rate: config.sample_rate,
        });
    }

    Ok(DecodedAudio {
        channels,
        sample_rate: config.sample_rate,
        checksum,
    })
}

/// Uppercase hex SHA-1 of a file's raw bytes.
pub fn file_checksum(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(checksum_bytes(&bytes))
}

fn checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect()
}

/// Recursively collect files under `root` matching one of `extensions`
/// (case-insensitive, no leading dot). Returned sorted for stable batches.
pub fn find_audio_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn decode_bytes(bytes: Vec<u8>, path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SoundprintError::Decode(format!("{}: {e}", path.display())))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| SoundprintError::Decode(format!("{}: no audio track", path.display())))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SoundprintError::Decode(format!("{}: unknown sample rate", path.display())))?;
    let num_channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| SoundprintError::Decode(format!("{}: unknown channel layout", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SoundprintError::Decode(format!("{}: {e}", path.display())))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break, // end of stream
        };
        if packet.track_id() != track_id {
            continue;
        }
        // a corrupt packet loses its samples, not the file
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(_) => continue,
        };
        let mut buffer = SymphoniaBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err(SoundprintError::Decode(format!(
            "{}: no decodable audio",
            path.display()
        )));
    }

    Ok((samples, sample_rate, num_channels))
}

fn resample(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 64,
        interpolation: rubato::SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        2.0,
        params,
        RESAMPLE_CHUNK,
        1,
    )
    .map_err(|e| SoundprintError::Decode(format!("resampler init: {e}")))?;

    let mut output = Vec::new();
    let mut position = 0;

    while position + RESAMPLE_CHUNK <= input.len() {
        let chunk = vec![input[position..position + RESAMPLE_CHUNK].to_vec()];
        let result = resampler
            .process(&chunk, None)
            .map_err(|e| SoundprintError::Decode(format!("resample: {e}")))?;
        output.extend_from_slice(&result[0]);
        position += RESAMPLE_CHUNK;
    }

    let remaining = input.len() - position;
    if remaining > 0 {
        let mut padded = vec![0.0; RESAMPLE_CHUNK];
        padded[..remaining].copy_from_slice(&input[position..]);
        let result = resampler
            .process(&[padded], None)
            .map_err(|e| SoundprintError::Decode(format!("resample: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output)
}
