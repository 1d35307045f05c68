//! Send delay (echo) with filtered, saturated feedback
//!
//! Runs fully wet on the shared delay send. The feedback path is
//! high-passed at 80Hz so repeats do not build up low end.

use super::Effect;
use std::f32::consts::PI;

/// Maximum delay time in seconds
const MAX_DELAY_SECS: f32 = 2.0;

/// Delay time smoothing per frame
const DELAY_SMOOTH: f32 = 0.9995;

/// Stereo delay line
pub struct Delay {
    sample_rate: f32,
    /// Stereo interleaved: L,R,L,R,...
    buffer: Vec<f32>,
    buffer_frames: usize,
    write_pos: usize,
    /// Current delay in fractional frames
    delay_frames: f32,
    target_delay: f32,
    /// Feedback amount (0.0 - 0.95)
    feedback: f32,
    hp_state: [f32; 2],
    hp_coeff: f32,
}

impl Delay {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let buffer_frames = (sr * MAX_DELAY_SECS) as usize;

        Self {
            sample_rate: sr,
            buffer: vec![0.0; buffer_frames * 2],
            buffer_frames,
            write_pos: 0,
            delay_frames: sr * 0.375,
            target_delay: sr * 0.375,
            feedback: 0.4,
            hp_state: [0.0; 2],
            hp_coeff: (-2.0 * PI * 80.0 / sr).exp(),
        }
    }

    /// Set delay time in seconds; applied immediately
    pub fn set_delay_secs(&mut self, secs: f32) {
        self.set_target_secs(secs);
        self.delay_frames = self.target_delay;
    }

    /// Glide toward a new delay time
    pub fn set_target_secs(&mut self, secs: f32) {
        let max_frames = self.buffer_frames as f32 - 4.0;
        self.target_delay = (secs * self.sample_rate).clamp(1.0, max_frames);
    }

    pub fn delay_secs(&self) -> f32 {
        self.delay_frames / self.sample_rate
    }

    /// Set feedback amount (0.0 - 0.95)
    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    /// Linear interpolation between the two frames around `delay`
    #[inline]
    fn read(&self, delay: f32) -> (f32, f32) {
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let newer = (self.write_pos + self.buffer_frames - whole) % self.buffer_frames;
        let older = (newer + self.buffer_frames - 1) % self.buffer_frames;

        let l = self.buffer[newer * 2] * (1.0 - frac) + self.buffer[older * 2] * frac;
        let r = self.buffer[newer * 2 + 1] * (1.0 - frac) + self.buffer[older * 2 + 1] * frac;
        (l, r)
    }

    #[inline(always)]
    fn soft_saturate(x: f32) -> f32 {
        x / (1.0 + x.abs())
    }
}

impl Effect for Delay {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            self.delay_frames = self.delay_frames * DELAY_SMOOTH + self.target_delay * (1.0 - DELAY_SMOOTH);
            let (delayed_l, delayed_r) = self.read(self.delay_frames);

            let write_idx = self.write_pos * 2;
            for (ch, delayed) in [delayed_l, delayed_r].into_iter().enumerate() {
                let fb_in = frame[ch] + delayed * self.feedback;
                let hp_out = fb_in - self.hp_state[ch];
                self.hp_state[ch] = fb_in * (1.0 - self.hp_coeff) + self.hp_state[ch] * self.hp_coeff;
                self.buffer[write_idx + ch] = Self::soft_saturate(hp_out);
            }

            frame[0] = delayed_l;
            frame[1] = delayed_r;
            self.write_pos = (self.write_pos + 1) % self.buffer_frames;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.delay_frames = self.target_delay;
        self.hp_state = [0.0; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_repeats_after_delay_time() {
        let mut delay = Delay::new(1000);
        delay.set_delay_secs(0.1);
        delay.set_feedback(0.0);

        let mut samples = vec![0.0f32; 400];
        samples[0] = 0.5;
        samples[1] = 0.5;
        delay.process(&mut samples);

        // Wet only: nothing at t=0, echo 100 frames later
        assert_eq!(samples[0], 0.0);
        let echo = samples[200];
        assert!(echo > 0.2, "echo {}", echo);
        assert!(samples[..198].iter().all(|&s| s.abs() < 1e-3));
    }

    #[test]
    fn test_delay_time_clamped_to_buffer() {
        let mut delay = Delay::new(44100);
        delay.set_delay_secs(10.0);
        assert!(delay.delay_secs() < MAX_DELAY_SECS);
        delay.set_delay_secs(0.375);
        assert!((delay.delay_secs() - 0.375).abs() < 1e-4);
    }

    #[test]
    fn test_feedback_stays_bounded() {
        let mut delay = Delay::new(44100);
        delay.set_feedback(5.0);
        assert_eq!(delay.feedback(), 0.95);

        let mut samples = vec![1.0f32; 44100 * 2];
        delay.process(&mut samples);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }
}
