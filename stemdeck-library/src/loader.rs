//! Audio file loading and decoding

use std::path::{Path, PathBuf};

use stemdeck_audio::ENGINE_SAMPLE_RATE;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur during track loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Unsupported format")]
    UnsupportedFormat,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("No cached stems in {0}")]
    MissingStems(PathBuf),
}

/// Track metadata
#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: f64,
    /// Rate of the file before resampling
    pub source_sample_rate: u32,
    /// Channel count of the file before stereo conversion
    pub source_channels: u16,
}

/// A decoded track, stereo at the loader's sample rate
pub struct LoadedTrack {
    /// Interleaved stereo samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub metadata: TrackMetadata,
}

impl LoadedTrack {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Audio file loader using Symphonia
pub struct TrackLoader {
    target_sample_rate: u32,
}

impl Default for TrackLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLoader {
    /// Create a loader producing audio at the engine rate
    pub fn new() -> Self {
        Self::with_sample_rate(ENGINE_SAMPLE_RATE)
    }

    /// Create a new track loader with specific sample rate
    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Load and decode an audio file to interleaved stereo
    pub fn load(&self, path: &Path) -> Result<LoadedTrack, LoadError> {
        // Open the file
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        // Probe the format
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| match e {
                symphonia::core::errors::Error::Unsupported(_) => LoadError::UnsupportedFormat,
                other => LoadError::Decode(other.to_string()),
            })?;

        let mut format = probed.format;

        // Find first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let source_sample_rate = codec_params.sample_rate.unwrap_or(ENGINE_SAMPLE_RATE);

        // Create decoder
        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|_| LoadError::UnsupportedFormat)?;

        let mut metadata = extract_metadata(&mut format, path);
        metadata.source_sample_rate = source_sample_rate;

        // Decode all samples
        let mut samples: Vec<f32> = Vec::new();
        let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    tracing::debug!("Loader: stopping at packet error: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(_) => continue,
            };

            // Convert to f32 interleaved
            let spec = *decoded.spec();
            channels = spec.channels.count();
            let duration = decoded.capacity() as u64;

            let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if channels == 0 {
            return Err(LoadError::NoAudioTrack);
        }
        metadata.source_channels = channels as u16;

        let stereo = to_stereo(&samples, channels);
        metadata.duration_secs = (stereo.len() / 2) as f64 / source_sample_rate as f64;

        // Resample if needed
        let samples = if source_sample_rate != self.target_sample_rate {
            resample_stereo(&stereo, source_sample_rate, self.target_sample_rate)?
        } else {
            stereo
        };

        Ok(LoadedTrack {
            samples,
            sample_rate: self.target_sample_rate,
            metadata,
        })
    }
}

/// Fold any channel layout to interleaved stereo
///
/// Mono is duplicated; layouts wider than stereo keep the front pair.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples.chunks_exact(n).flat_map(|f| [f[0], f[1]]).collect(),
    }
}

/// Resample interleaved stereo audio
pub fn resample_stereo(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, LoadError> {
    use rubato::{FftFixedInOut, Resampler};

    const CHANNELS: usize = 2;
    let frames = samples.len() / CHANNELS;
    if frames == 0 {
        return Ok(Vec::new());
    }

    // Create resampler
    let mut resampler = FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, 1024, CHANNELS)
        .map_err(|e| LoadError::Resample(e.to_string()))?;

    // Deinterleave
    let deinterleaved: Vec<Vec<f32>> = (0..CHANNELS)
        .map(|ch| (0..frames).map(|f| samples[f * CHANNELS + ch]).collect())
        .collect();

    // Process in chunks
    let chunk_size = resampler.input_frames_next();
    let mut output: Vec<Vec<f32>> = vec![Vec::new(); CHANNELS];

    let mut pos = 0;
    while pos + chunk_size <= frames {
        let input_refs: Vec<&[f32]> = deinterleaved.iter().map(|ch| &ch[pos..pos + chunk_size]).collect();

        let resampled = resampler
            .process(&input_refs, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;

        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(data);
        }

        pos += chunk_size;
    }

    // Handle remaining samples (pad with zeros)
    if pos < frames {
        let remaining = frames - pos;
        let padded: Vec<Vec<f32>> = deinterleaved
            .iter()
            .map(|ch| {
                let mut v = ch[pos..].to_vec();
                v.resize(chunk_size, 0.0);
                v
            })
            .collect();

        let input_refs: Vec<&[f32]> = padded.iter().map(|v| v.as_slice()).collect();

        let resampled = resampler
            .process(&input_refs, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        // Only take the proportional amount of output
        let output_frames = remaining * target_rate as usize / source_rate as usize;
        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(&data[..output_frames.min(data.len())]);
        }
    }

    // Reinterleave
    let output_frames = output[0].len().min(output[1].len());
    let mut interleaved = Vec::with_capacity(output_frames * CHANNELS);
    for frame_idx in 0..output_frames {
        for channel in &output {
            interleaved.push(channel[frame_idx]);
        }
    }

    Ok(interleaved)
}

/// Extract metadata from format reader
fn extract_metadata(format: &mut Box<dyn symphonia::core::formats::FormatReader>, path: &Path) -> TrackMetadata {
    let mut metadata = TrackMetadata {
        title: path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string(),
        artist: "Unknown".to_string(),
        album: "Unknown".to_string(),
        ..Default::default()
    };

    if let Some(meta) = format.metadata().current() {
        for tag in meta.tags() {
            match tag.std_key {
                Some(symphonia::core::meta::StandardTagKey::TrackTitle) => {
                    metadata.title = tag.value.to_string();
                }
                Some(symphonia::core::meta::StandardTagKey::Artist) => {
                    metadata.artist = tag.value.to_string();
                }
                Some(symphonia::core::meta::StandardTagKey::Album) => {
                    metadata.album = tag.value.to_string();
                }
                _ => {}
            }
        }
    }

    metadata
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// Write a 16-bit PCM WAV file
    pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stemdeck-test-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_to_stereo_layouts() {
        assert_eq!(to_stereo(&[0.1, 0.2], 1), vec![0.1, 0.1, 0.2, 0.2]);
        assert_eq!(to_stereo(&[0.1, 0.2], 2), vec![0.1, 0.2]);
        assert_eq!(to_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3), vec![1.0, 2.0, 4.0, 5.0]);
        assert!(to_stereo(&[1.0], 0).is_empty());
    }

    #[test]
    fn test_resample_length() {
        let frames = 48000;
        let samples: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 0.01).sin() * 0.5;
                [s, s]
            })
            .collect();
        let out = resample_stereo(&samples, 48000, 44100).unwrap();
        let out_frames = out.len() / 2;
        assert!((out_frames as i64 - 44100).abs() < 50, "got {}", out_frames);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_load_missing_file() {
        let loader = TrackLoader::new();
        let err = loader.load(Path::new("/definitely/not/here.wav"));
        assert!(matches!(err, Err(LoadError::Io(_))));
    }

    #[test]
    fn test_load_mono_wav_to_stereo() {
        let dir = scratch_dir("loader");
        let path = dir.join("tone.wav");
        let samples: Vec<i16> = (0..4410).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        write_wav(&path, 44100, 1, &samples);

        let track = TrackLoader::new().load(&path).unwrap();
        assert_eq!(track.sample_rate, 44100);
        assert_eq!(track.frames(), 4410);
        assert_eq!(track.metadata.source_channels, 1);
        assert_eq!(track.metadata.title, "tone");
        assert!((track.samples[0] - 0.5).abs() < 1e-3);
        assert_eq!(track.samples[0], track.samples[1]);
        assert!((track.metadata.duration_secs - 0.1).abs() < 1e-6);
        let _ = fs::remove_dir_all(dir);
    }
}
