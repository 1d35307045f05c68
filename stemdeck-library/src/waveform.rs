//! Peak envelope of a track for display, with a pseudo three-band split

const BINS_PER_SEC: f64 = 120.0;
const MIN_POINTS: usize = 4000;
const MAX_POINTS: usize = 20000;
/// Weight of the high band in the band split
const HIGH_WEIGHT: f32 = 0.55;

/// Envelope of the mono mix
#[derive(Debug, Clone, Default)]
pub struct Waveform {
    /// Start time of each bin in seconds
    pub times: Vec<f32>,
    pub peaks: Vec<f32>,
    pub low: Vec<f32>,
    pub mid: Vec<f32>,
    pub high: Vec<f32>,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

/// Bin count for a track: ~120 bins per second, clamped
pub fn waveform_points(frames: usize, sample_rate: u32) -> usize {
    let secs = frames as f64 / sample_rate.max(1) as f64;
    ((secs * BINS_PER_SEC) as usize).clamp(MIN_POINTS, MAX_POINTS)
}

/// Centered moving average, zero outside the signal
fn moving_average(x: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 {
        return x.to_vec();
    }
    let n = x.len();
    let mut prefix = vec![0.0f64; n + 1];
    for (i, v) in x.iter().enumerate() {
        prefix[i + 1] = prefix[i] + *v as f64;
    }
    let before = window / 2;
    let after = (window - 1) / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(n);
            ((prefix[hi] - prefix[lo]) / window as f64) as f32
        })
        .collect()
}

/// Compute the envelope of interleaved stereo `samples` with about `points` bins
pub fn compute_waveform(samples: &[f32], sample_rate: u32, points: usize) -> Waveform {
    let frames = samples.len() / 2;
    if frames == 0 {
        return Waveform::default();
    }
    let points = points.max(200);
    let hop = (frames / points).max(1);

    let mut times = Vec::with_capacity(frames / hop + 1);
    let mut peaks = Vec::with_capacity(frames / hop + 1);
    for (i, bin) in samples.chunks(hop * 2).enumerate() {
        let peak = bin
            .chunks_exact(2)
            .map(|f| ((f[0] + f[1]) * 0.5).abs())
            .fold(0.0f32, f32::max);
        peaks.push(peak);
        times.push((i * hop) as f32 / sample_rate.max(1) as f32);
    }

    if peaks.len() < 2 {
        return Waveform {
            times,
            low: peaks.clone(),
            mid: peaks.clone(),
            high: peaks.clone(),
            peaks,
        };
    }

    let slow = moving_average(&peaks, (peaks.len() / 120).max(3));
    let medium = moving_average(&peaks, (peaks.len() / 300).max(3));

    let mut low = Vec::with_capacity(peaks.len());
    let mut mid = Vec::with_capacity(peaks.len());
    let mut high = Vec::with_capacity(peaks.len());
    for i in 0..peaks.len() {
        let e_low = slow[i].max(0.0);
        let e_mid = (medium[i] - slow[i]).max(0.0);
        let e_high = (peaks[i] - medium[i]).max(0.0) * HIGH_WEIGHT;
        let total = e_low + e_mid + e_high + 1e-6;
        low.push(peaks[i] * e_low / total);
        mid.push(peaks[i] * e_mid / total);
        high.push(peaks[i] * e_high / total);
    }

    Waveform {
        times,
        peaks,
        low,
        mid,
        high,
    }
}
