//! Master bus compressor
//!
//! Linked-stereo peak compressor run after the crossfade and synth sum.
//! Gain reduction follows a one-pole attack/release envelope.

use super::Effect;
use crate::mixer::db_to_linear;

/// Master compressor
pub struct Compressor {
    sample_rate: f32,

    threshold: f32, // dB (-60 to 0)
    ratio: f32,     // 1 to 20
    knee: f32,      // dB (0-12), 0 is a hard knee
    attack: f32,    // ms
    release: f32,   // ms

    attack_coeff: f32,
    release_coeff: f32,

    /// Smoothed linear gain
    envelope: f32,
    current_gr_db: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        let mut comp = Self {
            sample_rate,
            threshold: -1.0,
            ratio: 4.0,
            knee: 0.0,
            attack: 1.0,
            release: 100.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 1.0,
            current_gr_db: 0.0,
        };
        comp.update_coefficients();
        comp
    }

    /// Set threshold in dB (-60 to 0)
    pub fn set_threshold(&mut self, db: f32) {
        self.threshold = db.clamp(-60.0, 0.0);
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Set compression ratio (1 to 20)
    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.clamp(1.0, 20.0);
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Set knee width in dB (0-12)
    pub fn set_knee(&mut self, knee_db: f32) {
        self.knee = knee_db.clamp(0.0, 12.0);
    }

    /// Set attack time in ms (0.1-100)
    pub fn set_attack_ms(&mut self, ms: f32) {
        self.attack = ms.clamp(0.1, 100.0);
        self.update_coefficients();
    }

    /// Set release time in ms (10-1000)
    pub fn set_release_ms(&mut self, ms: f32) {
        self.release = ms.clamp(10.0, 1000.0);
        self.update_coefficients();
    }

    /// Current gain reduction in dB (<= 0)
    pub fn gain_reduction_db(&self) -> f32 {
        self.current_gr_db
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_to_coeff(self.attack, self.sample_rate);
        self.release_coeff = time_to_coeff(self.release, self.sample_rate);
    }

    /// Static gain curve: dB change for a given input level
    #[inline]
    fn compute_gain_reduction(&self, input_db: f32) -> f32 {
        let half_knee = self.knee / 2.0;
        if input_db <= self.threshold - half_knee {
            0.0
        } else if self.knee <= 0.0 || input_db >= self.threshold + half_knee {
            self.threshold + (input_db - self.threshold) / self.ratio - input_db
        } else {
            let x = input_db - (self.threshold - half_knee);
            (1.0 / self.ratio - 1.0) * (x * x) / (2.0 * self.knee)
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let peak_db = linear_to_db(left.abs().max(right.abs()));
        let target = db_to_linear(self.compute_gain_reduction(peak_db));

        let coeff = if target < self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * target;
        self.current_gr_db = linear_to_db(self.envelope);

        (left * self.envelope, right * self.envelope)
    }
}

#[inline]
fn time_to_coeff(ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (sample_rate * ms / 1000.0)).exp()
}

#[inline]
fn linear_to_db(linear: f32) -> f32 {
    if linear > 1e-10 {
        20.0 * linear.log10()
    } else {
        -200.0
    }
}

impl Effect for Compressor {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            let (l, r) = self.process_frame(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
    }

    fn reset(&mut self) {
        self.envelope = 1.0;
        self.current_gr_db = 0.0;
    }
}
