//! Per-deck musical clock: playhead, tempo, loop region and speed

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;
pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 4.0;
pub const DEFAULT_BPM: f64 = 120.0;
pub const BEATS_PER_BAR: u32 = 4;

/// Musical position derived from the playhead
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatInfo {
    /// 1-based bar number
    pub bar: u64,
    /// 1-based beat within the bar
    pub beat: u32,
    /// Fraction of the current beat in [0, 1)
    pub phase: f64,
}

/// Sample-accurate transport
#[derive(Debug, Clone)]
pub struct Transport {
    sample_rate: u32,
    bpm: f64,
    playing: bool,
    playhead: u64,
    loop_start: u64,
    loop_end: u64,
    looping: bool,
    speed: f64,
    beats_per_bar: u32,
    samples_per_beat: f64,
}

impl Transport {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            sample_rate,
            bpm: DEFAULT_BPM,
            playing: false,
            playhead: 0,
            loop_start: 0,
            loop_end: 0,
            looping: false,
            speed: 1.0,
            beats_per_bar: BEATS_PER_BAR,
            samples_per_beat: Self::beat_length(DEFAULT_BPM, sample_rate),
        }
    }

    fn beat_length(bpm: f64, sample_rate: u32) -> f64 {
        60.0 / bpm * sample_rate as f64
    }

    pub fn start(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Move the playhead; negative positions clamp to zero
    pub fn seek(&mut self, position: i64) {
        self.playhead = position.max(0) as u64;
    }

    pub fn playhead(&self) -> u64 {
        self.playhead
    }

    /// Set tempo (clamped to 20-999 BPM); non-finite values are ignored
    pub fn set_bpm(&mut self, bpm: f64) {
        if !bpm.is_finite() {
            return;
        }
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.samples_per_beat = Self::beat_length(self.bpm, self.sample_rate);
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set playback speed multiplier (clamped to 0.25-4.0)
    pub fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() {
            return;
        }
        self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_loop(&mut self, start: u64, end: u64) {
        self.loop_start = start;
        self.loop_end = end;
    }

    pub fn loop_region(&self) -> (u64, u64) {
        (self.loop_start, self.loop_end)
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn samples_per_beat(&self) -> f64 {
        self.samples_per_beat
    }

    pub fn samples_per_bar(&self) -> f64 {
        self.samples_per_beat * self.beats_per_bar as f64
    }

    /// Playhead expressed in beats
    pub fn total_beats(&self) -> f64 {
        self.playhead as f64 / self.samples_per_beat
    }

    /// Advance by `frames` scaled by speed, wrapping inside an active loop
    pub fn advance(&mut self, frames: usize) {
        if !self.playing {
            return;
        }
        let mut step = (frames as f64 * self.speed).round() as u64;
        if step == 0 {
            step = frames as u64;
        }
        self.playhead += step;

        if self.looping && self.loop_end > self.loop_start && self.playhead >= self.loop_end {
            let overshoot = self.playhead - self.loop_end;
            let length = self.loop_end - self.loop_start;
            self.playhead = self.loop_start + overshoot % length;
        }
    }

    pub fn beat_info(&self) -> BeatInfo {
        let total = self.total_beats();
        let per_bar = self.beats_per_bar as f64;
        BeatInfo {
            bar: (total / per_bar).floor() as u64 + 1,
            beat: (total % per_bar).floor() as u32 + 1,
            phase: total.fract(),
        }
    }
}
