//! Per-lane high-pass / low-pass filtering
//!
//! First-order Butterworth sections (bilinear transform) with stereo
//! state. Each section is created lazily the first time its cutoff
//! leaves the bypass range and keeps its state from then on.

use std::f32::consts::PI;

/// High-pass cutoffs at or below this are bypassed
pub const HP_BYPASS_HZ: f32 = 20.0;
/// Low-pass cutoffs at or above this are bypassed
pub const LP_BYPASS_HZ: f32 = 19000.0;
/// Coefficients are only recomputed for larger cutoff moves
const RECALC_THRESHOLD_HZ: f32 = 1.0;

/// Filter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
}

/// One first-order section, `y = b0*x + b1*x1 - a1*y1`
#[derive(Debug, Clone)]
struct OnePole {
    filter_type: FilterType,
    sample_rate: f32,
    cutoff: f32,
    b0: f32,
    b1: f32,
    a1: f32,
    x1: [f32; 2],
    y1: [f32; 2],
}

impl OnePole {
    fn new(filter_type: FilterType, sample_rate: f32, cutoff: f32) -> Self {
        let mut section = Self {
            filter_type,
            sample_rate,
            cutoff,
            b0: 1.0,
            b1: 0.0,
            a1: 0.0,
            x1: [0.0; 2],
            y1: [0.0; 2],
        };
        section.calculate_coefficients();
        section
    }

    fn set_cutoff(&mut self, cutoff: f32) {
        if (cutoff - self.cutoff).abs() > RECALC_THRESHOLD_HZ {
            self.cutoff = cutoff;
            self.calculate_coefficients();
        }
    }

    fn calculate_coefficients(&mut self) {
        let nyquist = self.sample_rate * 0.5;
        let normalized = (self.cutoff / nyquist).clamp(0.001, 0.999);
        let k = (PI * normalized * 0.5).tan();
        let norm = 1.0 / (1.0 + k);

        match self.filter_type {
            FilterType::LowPass => {
                self.b0 = k * norm;
                self.b1 = k * norm;
            }
            FilterType::HighPass => {
                self.b0 = norm;
                self.b1 = -norm;
            }
        }
        self.a1 = (k - 1.0) * norm;
    }

    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let x = *sample;
                let y = self.b0 * x + self.b1 * self.x1[ch] - self.a1 * self.y1[ch];
                self.x1[ch] = x;
                self.y1[ch] = y;
                *sample = y;
            }
        }

        if !(self.y1[0].is_finite() && self.y1[1].is_finite()) {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.x1 = [0.0; 2];
        self.y1 = [0.0; 2];
    }
}

/// High-pass followed by low-pass for one lane
#[derive(Debug, Clone)]
pub struct LaneFilter {
    sample_rate: f32,
    high_pass: Option<OnePole>,
    low_pass: Option<OnePole>,
}

impl LaneFilter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            high_pass: None,
            low_pass: None,
        }
    }

    /// Filter interleaved stereo samples in place
    pub fn process(&mut self, samples: &mut [f32], hp_cutoff: f32, lp_cutoff: f32) {
        if hp_cutoff > HP_BYPASS_HZ {
            let sr = self.sample_rate;
            self.high_pass
                .get_or_insert_with(|| OnePole::new(FilterType::HighPass, sr, hp_cutoff))
                .set_cutoff(hp_cutoff);
            if let Some(hp) = self.high_pass.as_mut() {
                hp.process(samples);
            }
        }

        if lp_cutoff < LP_BYPASS_HZ {
            let sr = self.sample_rate;
            self.low_pass
                .get_or_insert_with(|| OnePole::new(FilterType::LowPass, sr, lp_cutoff))
                .set_cutoff(lp_cutoff);
            if let Some(lp) = self.low_pass.as_mut() {
                lp.process(samples);
            }
        }
    }

    pub fn reset(&mut self) {
        if let Some(hp) = self.high_pass.as_mut() {
            hp.reset();
        }
        if let Some(lp) = self.low_pass.as_mut() {
            lp.reset();
        }
    }
}
