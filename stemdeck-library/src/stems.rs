//! Cached stem loading and lane derivation
//!
//! Four separated stems (drums, bass, other, vocals) are split into the
//! eight performance lanes with zero-phase Butterworth filters.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stemdeck_audio::{LaneBuffers, NUM_LANES};

use crate::loader::{LoadError, TrackLoader};

pub const STEM_NAMES: [&str; 4] = ["drums", "bass", "other", "vocals"];

/// Butterworth Q for a 2nd-order section
const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Separated stems as interleaved stereo at the engine rate
#[derive(Debug, Clone, Default)]
pub struct Stems {
    pub drums: Option<Vec<f32>>,
    pub bass: Option<Vec<f32>>,
    pub other: Option<Vec<f32>>,
    pub vocals: Option<Vec<f32>>,
}

/// Directory holding the cached stems of `track` under `root`
pub fn stems_dir_for(root: &Path, track: &Path) -> PathBuf {
    let name = track.file_stem().and_then(|s| s.to_str()).unwrap_or("track");
    root.join(name)
}

/// Load `<dir>/{drums,bass,other,vocals}.wav`; all four must exist
pub fn load_cached_stems(dir: &Path, loader: &TrackLoader) -> Result<Stems, LoadError> {
    if STEM_NAMES.iter().any(|name| !dir.join(format!("{}.wav", name)).is_file()) {
        return Err(LoadError::MissingStems(dir.to_path_buf()));
    }
    let load = |name: &str| -> Result<Option<Vec<f32>>, LoadError> {
        let track = loader.load(&dir.join(format!("{}.wav", name)))?;
        Ok(Some(track.samples))
    };
    Ok(Stems {
        drums: load("drums")?,
        bass: load("bass")?,
        other: load("other")?,
        vocals: load("vocals")?,
    })
}

/// Pad with silence or truncate to exactly `frames` stereo frames
pub fn fit_length(mut buffer: Vec<f32>, frames: usize) -> Vec<f32> {
    buffer.resize(frames * 2, 0.0);
    buffer
}

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn low_pass(cutoff: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = Self::prewarp(cutoff, sample_rate);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w) / 2.0 / a0,
            b1: (1.0 - cos_w) / a0,
            b2: (1.0 - cos_w) / 2.0 / a0,
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn high_pass(cutoff: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = Self::prewarp(cutoff, sample_rate);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w) / 2.0 / a0,
            b1: -(1.0 + cos_w) / a0,
            b2: (1.0 + cos_w) / 2.0 / a0,
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn prewarp(cutoff: f64, sample_rate: f64) -> (f64, f64) {
        let omega = 2.0 * PI * cutoff.clamp(1.0, sample_rate * 0.49) / sample_rate;
        (omega.cos(), omega.sin() / (2.0 * BUTTERWORTH_Q))
    }

    /// Direct form I over one channel of an interleaved stereo buffer
    fn run<I: Iterator<Item = usize>>(&self, data: &mut [f64], indices: I) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        for i in indices {
            let x = data[i];
            let y = self.b0 * x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
            data[i] = y;
        }
    }

    /// Zero-phase filtering: forward pass then backward pass per channel
    fn filtfilt(&self, input: &[f32]) -> Vec<f32> {
        let mut data: Vec<f64> = input.iter().map(|&s| s as f64).collect();
        let frames = data.len() / 2;
        for ch in 0..2 {
            self.run(&mut data, (0..frames).map(|f| f * 2 + ch));
            self.run(&mut data, (0..frames).rev().map(|f| f * 2 + ch));
        }
        data.into_iter().map(|s| s as f32).collect()
    }
}

fn sub(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// Split four stems into the eight lanes, each exactly `frames` long
///
/// Lane order: kick, snare/clap, hats, perc/top, bass, chords, lead, vox.
/// Missing stems give silent lanes.
pub fn derive_lanes(stems: &Stems, frames: usize, sample_rate: u32) -> [Vec<f32>; NUM_LANES] {
    let sr = sample_rate as f64;
    let stem = |s: &Option<Vec<f32>>| match s {
        Some(buf) => fit_length(buf.clone(), frames),
        None => vec![0.0; frames * 2],
    };

    let drums = stem(&stems.drums);
    let kick = Biquad::low_pass(150.0, sr).filtfilt(&drums);
    let hats = Biquad::high_pass(5000.0, sr).filtfilt(&drums);
    let snare = Biquad::low_pass(4000.0, sr).filtfilt(&Biquad::high_pass(200.0, sr).filtfilt(&drums));
    let perc = sub(&sub(&sub(&drums, &kick), &hats), &snare);

    let other = stem(&stems.other);
    let chords = Biquad::low_pass(1000.0, sr).filtfilt(&other);
    let lead = Biquad::high_pass(1000.0, sr).filtfilt(&other);

    [kick, snare, hats, perc, stem(&stems.bass), chords, lead, stem(&stems.vocals)]
}

/// Wrap derived lanes for the engine's `LoadStems` command
pub fn lane_buffers(lanes: [Vec<f32>; NUM_LANES]) -> Box<LaneBuffers> {
    Box::new(lanes.map(|lane| Some(Arc::new(lane))))
}
