//! Freeverb-style send reverb
//!
//! Parallel lowpass-feedback combs into series allpasses. Runs fully wet
//! on a send bus; the dry signal stays on the lanes.

use super::Effect;

/// Comb delay lengths in samples at 44.1kHz
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass delay lengths in samples at 44.1kHz
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

/// Extra samples on the right channel
const STEREO_SPREAD: usize = 23;

struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - damping) + self.filter_store * damping;
        self.buffer[self.index] = input + self.filter_store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.index = 0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// Stereo reverb used on the shared reverb send
pub struct Reverb {
    comb_l: [CombFilter; 8],
    allpass_l: [AllpassFilter; 4],
    comb_r: [CombFilter; 8],
    allpass_r: [AllpassFilter; 4],

    room_size: f32, // 0.0 - 1.0
    damping: f32,   // 0.0 - 1.0
    width: f32,     // 0.0 - 1.0

    feedback: f32,
    wet1: f32,
    wet2: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let spread = (STEREO_SPREAD as f32 * scale) as usize;
        let scaled = |len: usize| (len as f32 * scale) as usize;

        let mut reverb = Self {
            comb_l: std::array::from_fn(|i| CombFilter::new(scaled(COMB_TUNINGS[i]))),
            allpass_l: std::array::from_fn(|i| AllpassFilter::new(scaled(ALLPASS_TUNINGS[i]))),
            comb_r: std::array::from_fn(|i| CombFilter::new(scaled(COMB_TUNINGS[i]) + spread)),
            allpass_r: std::array::from_fn(|i| AllpassFilter::new(scaled(ALLPASS_TUNINGS[i]) + spread)),
            room_size: 0.8,
            damping: 0.5,
            width: 1.0,
            feedback: 0.0,
            wet1: 0.0,
            wet2: 0.0,
        };
        reverb.update_gains();
        reverb
    }

    fn update_gains(&mut self) {
        self.feedback = self.room_size * 0.24 + 0.6;
        self.wet1 = self.width * 0.5 + 0.5;
        self.wet2 = (1.0 - self.width) * 0.5;
    }

    /// Set room size (0.0 - 1.0)
    pub fn set_room_size(&mut self, size: f32) {
        self.room_size = size.clamp(0.0, 1.0);
        self.update_gains();
    }

    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    /// Set damping (0.0 - 1.0)
    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping.clamp(0.0, 1.0);
    }

    /// Set stereo width (0.0 - 1.0)
    pub fn set_width(&mut self, width: f32) {
        self.width = width.clamp(0.0, 1.0);
        self.update_gains();
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * 0.25;

        let mut out_l = 0.0;
        let mut out_r = 0.0;
        for comb in &mut self.comb_l {
            out_l += comb.process(input, self.feedback, self.damping);
        }
        for comb in &mut self.comb_r {
            out_r += comb.process(input, self.feedback, self.damping);
        }
        out_l *= 0.125;
        out_r *= 0.125;

        for allpass in &mut self.allpass_l {
            out_l = allpass.process(out_l);
        }
        for allpass in &mut self.allpass_r {
            out_r = allpass.process(out_r);
        }

        (
            out_l * self.wet1 + out_r * self.wet2,
            out_r * self.wet1 + out_l * self.wet2,
        )
    }
}

impl Effect for Reverb {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            let (l, r) = self.process_frame(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
    }

    fn reset(&mut self) {
        for comb in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            comb.reset();
        }
        for allpass in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            allpass.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_in_silence_out() {
        let mut reverb = Reverb::new(44100);
        let mut samples = vec![0.0f32; 2048];
        reverb.process(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_impulse_produces_tail() {
        let mut reverb = Reverb::new(44100);
        let mut samples = vec![0.0f32; 8192];
        samples[0] = 1.0;
        samples[1] = 1.0;
        reverb.process(&mut samples);

        // Fully wet: the impulse itself is not passed through
        assert_eq!(samples[0], 0.0);
        let tail_energy: f32 = samples[2400..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() < 1.0));
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut reverb = Reverb::new(44100);
        let mut samples = vec![0.5f32; 4096];
        reverb.process(&mut samples);
        reverb.reset();

        let mut silence = vec![0.0f32; 4096];
        reverb.process(&mut silence);
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_room_size_clamped() {
        let mut reverb = Reverb::new(44100);
        reverb.set_room_size(3.0);
        assert_eq!(reverb.room_size(), 1.0);
        assert!(reverb.feedback < 1.0);
    }
}
