//! Step-sequenced synth rack
//!
//! Each lane is a monophonic voice: oscillator, ADSR envelope and a
//! one-pole low-pass per channel, stepped on a 16th-note grid derived
//! from the clock deck's tempo and playhead.

use std::f32::consts::PI;

use crate::commands::{PatchParam, SynthCommand};
use crate::error::ControlError;

pub const SYNTH_LANES: usize = 2;

const STEPS_PER_BEAT: f64 = 4.0;
const MIN_STAGE_SECS: f32 = 1e-4;

/// Oscillator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oscillator {
    Sine,
    Square,
    #[default]
    Saw,
    Noise,
}

impl Oscillator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sine" => Some(Oscillator::Sine),
            "square" => Some(Oscillator::Square),
            "saw" => Some(Oscillator::Saw),
            "noise" => Some(Oscillator::Noise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthPatch {
    pub oscillator: Oscillator,
    pub amplitude: f32,
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// Level 0-1
    pub sustain: f32,
    /// Seconds
    pub release: f32,
    /// Low-pass cutoff in Hz
    pub cutoff: f32,
}

impl Default for SynthPatch {
    fn default() -> Self {
        Self {
            oscillator: Oscillator::Saw,
            amplitude: 0.6,
            attack: 0.005,
            decay: 0.08,
            sustain: 0.0,
            release: 0.08,
            cutoff: 16000.0,
        }
    }
}

impl SynthPatch {
    /// Apply one parameter; non-finite values are rejected, others clamped
    pub fn apply(&mut self, param: PatchParam) -> Result<(), ControlError> {
        let check = |v: f32, what: &'static str| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(ControlError::NonFinite(what))
            }
        };
        match param {
            PatchParam::Oscillator(osc) => self.oscillator = osc,
            PatchParam::Amplitude(v) => self.amplitude = check(v, "amplitude")?.clamp(0.0, 2.0),
            PatchParam::Attack(v) => self.attack = check(v, "attack")?.max(0.0),
            PatchParam::Decay(v) => self.decay = check(v, "decay")?.max(0.0),
            PatchParam::Sustain(v) => self.sustain = check(v, "sustain")?.clamp(0.0, 1.0),
            PatchParam::Release(v) => self.release = check(v, "release")?.max(0.0),
            PatchParam::Cutoff(v) => self.cutoff = check(v, "cutoff")?.max(0.0),
        }
        Ok(())
    }
}

/// MIDI note number to frequency, A4 = 440 Hz
#[inline]
pub fn midi_to_hz(midi: u8) -> f32 {
    440.0 * 2.0f32.powf((midi as f32 - 69.0) / 12.0)
}

/// Parse a note name such as `C4`, `F#3` or `Bb2` (C4 = 60)
pub fn note_to_midi(token: &str) -> Option<u8> {
    let upper = token.trim().to_ascii_uppercase();
    let mut chars = upper.chars();
    let letter = chars.next()?;
    let base: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (shift, octave) = match rest.strip_prefix('#') {
        Some(o) => (1, o),
        None => match rest.strip_prefix('B') {
            Some(o) => (-1, o),
            None => (0, rest),
        },
    };
    // Only the flats and sharps found on a keyboard
    if (shift == 1 && matches!(letter, 'E' | 'B')) || (shift == -1 && matches!(letter, 'C' | 'F')) {
        return None;
    }

    let octave: i32 = octave.parse().ok()?;
    let midi = (octave + 1) * 12 + base + shift;
    u8::try_from(midi).ok().filter(|m| *m <= 127)
}

/// Whitespace-separated notes; `~`, `R`, `REST` and anything unparsable rest
pub fn parse_note_pattern(pattern: &str) -> Vec<Option<u8>> {
    pattern.split_whitespace().map(note_to_midi).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// One-pole low-pass, `z = a*z + (1-a)*x`
#[derive(Debug, Clone, Default)]
struct OnePoleLowPass {
    z: f32,
}

impl OnePoleLowPass {
    #[inline]
    fn process(&mut self, x: f32, a: f32) -> f32 {
        self.z = a * self.z + (1.0 - a) * x;
        self.z
    }
}

/// How the voice filter treats its cutoff this block
#[derive(Debug, Clone, Copy)]
enum FilterMode {
    Bypass,
    Mute,
    LowPass(f32),
}

/// Monophonic pattern-driven voice
#[derive(Debug, Clone)]
pub struct SynthVoice {
    sample_rate: f32,
    patch: SynthPatch,
    pattern: Vec<Option<u8>>,
    step_index: usize,
    last_step: Option<u64>,
    note: Option<u8>,
    gate: bool,
    stage: EnvelopeStage,
    envelope: f32,
    phase: f32,
    filter_l: OnePoleLowPass,
    filter_r: OnePoleLowPass,
    noise_state: u64,
}

impl SynthVoice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            patch: SynthPatch::default(),
            pattern: Vec::new(),
            step_index: 0,
            last_step: None,
            note: None,
            gate: false,
            stage: EnvelopeStage::Idle,
            envelope: 0.0,
            phase: 0.0,
            filter_l: OnePoleLowPass::default(),
            filter_r: OnePoleLowPass::default(),
            noise_state: 0xDEADBEEF_CAFEBABE,
        }
    }

    pub fn set_pattern(&mut self, pattern: &str) {
        self.pattern = parse_note_pattern(pattern);
        self.step_index = 0;
        self.last_step = None;
    }

    pub fn pattern(&self) -> &[Option<u8>] {
        &self.pattern
    }

    pub fn patch(&self) -> &SynthPatch {
        &self.patch
    }

    pub fn patch_mut(&mut self) -> &mut SynthPatch {
        &mut self.patch
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn is_gated(&self) -> bool {
        self.gate
    }

    pub fn note(&self) -> Option<u8> {
        self.note
    }

    /// Frames per 16th note, never zero
    pub fn samples_per_step(&self, bpm: f64) -> u64 {
        let bpm = if bpm.is_finite() && bpm > 1e-3 { bpm } else { 120.0 };
        ((60.0 / bpm) * self.sample_rate as f64 / STEPS_PER_BEAT).round().max(1.0) as u64
    }

    /// Advance the pattern if `abs_sample` falls on a new step
    fn update_step(&mut self, abs_sample: u64, bpm: f64) {
        let step = abs_sample / self.samples_per_step(bpm);
        let Some(last) = self.last_step else {
            self.last_step = Some(step);
            return;
        };
        if step == last {
            return;
        }

        let delta = step.saturating_sub(last).max(1) as usize;
        self.step_index = (self.step_index + delta) % self.pattern.len();
        self.last_step = Some(step);

        match self.pattern[self.step_index] {
            Some(note) => {
                self.note = Some(note);
                self.gate = true;
                self.stage = EnvelopeStage::Attack;
            }
            None => {
                self.gate = false;
                if self.stage != EnvelopeStage::Idle {
                    self.stage = EnvelopeStage::Release;
                }
            }
        }
    }

    #[inline]
    fn next_envelope(&mut self, attack: f32, decay: f32, release: f32) -> f32 {
        let sustain = self.patch.sustain.clamp(0.0, 1.0);
        match self.stage {
            EnvelopeStage::Idle => self.envelope = 0.0,
            EnvelopeStage::Attack => {
                self.envelope = (self.envelope + attack).min(1.0);
                if self.envelope >= 1.0 {
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.envelope = (self.envelope - decay).max(sustain);
                if self.envelope <= sustain {
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => self.envelope = sustain,
            EnvelopeStage::Release => {
                self.envelope = (self.envelope - release).max(0.0);
                if self.envelope <= 0.0 {
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.envelope
    }

    /// xorshift64 white noise in [-1, 1]
    #[inline]
    fn next_noise(&mut self) -> f32 {
        self.noise_state ^= self.noise_state << 13;
        self.noise_state ^= self.noise_state >> 7;
        self.noise_state ^= self.noise_state << 17;
        (self.noise_state as f32 / u64::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    fn next_oscillator(&mut self, phase_inc: f32) -> f32 {
        let osc = self.patch.oscillator;
        if osc == Oscillator::Noise {
            return self.next_noise();
        }
        if phase_inc <= 0.0 {
            return 0.0;
        }
        let value = match osc {
            Oscillator::Sine => (2.0 * PI * self.phase).sin(),
            Oscillator::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Oscillator::Saw | Oscillator::Noise => 2.0 * self.phase - 1.0,
        };
        self.phase += phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }

    fn filter_mode(&self) -> FilterMode {
        let cutoff = self.patch.cutoff;
        if cutoff >= 0.49 * self.sample_rate {
            FilterMode::Bypass
        } else if cutoff <= 5.0 {
            FilterMode::Mute
        } else {
            FilterMode::LowPass((-2.0 * PI * cutoff / self.sample_rate).exp())
        }
    }

    /// Render one block into `out` (interleaved stereo, overwritten)
    ///
    /// `abs_sample` is the clock deck's playhead at the start of the block.
    pub fn render(&mut self, abs_sample: u64, bpm: f64, out: &mut [f32]) {
        out.fill(0.0);
        if self.pattern.is_empty() {
            return;
        }
        self.update_step(abs_sample, bpm);

        let sr = self.sample_rate;
        let attack = 1.0 / (self.patch.attack.max(MIN_STAGE_SECS) * sr).max(1.0);
        let decay = (1.0 - self.patch.sustain.clamp(0.0, 1.0)) / (self.patch.decay.max(MIN_STAGE_SECS) * sr).max(1.0);
        let release = 1.0 / (self.patch.release.max(MIN_STAGE_SECS) * sr).max(1.0);
        let phase_inc = self.note.map_or(0.0, |n| midi_to_hz(n) / sr);
        let amplitude = self.patch.amplitude;
        let mode = self.filter_mode();

        for frame in out.chunks_exact_mut(2) {
            let env = self.next_envelope(attack, decay, release);
            let sig = self.next_oscillator(phase_inc) * env * amplitude;
            let (l, r) = match mode {
                FilterMode::Bypass => (sig, sig),
                FilterMode::Mute => (0.0, 0.0),
                FilterMode::LowPass(a) => (self.filter_l.process(sig, a), self.filter_r.process(sig, a)),
            };
            frame[0] = l;
            frame[1] = r;
        }
    }
}

/// Two-lane synth rack summed into the master bus
#[derive(Debug, Clone)]
pub struct SynthRack {
    voices: [SynthVoice; SYNTH_LANES],
    lane_gain: [f32; SYNTH_LANES],
    lane_pan: [f32; SYNTH_LANES],
    lane_mute: [bool; SYNTH_LANES],
    gain: f32,
    enabled: bool,
    scratch: Vec<f32>,
}

impl SynthRack {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            voices: std::array::from_fn(|_| SynthVoice::new(sample_rate)),
            lane_gain: [1.0; SYNTH_LANES],
            lane_pan: [0.0; SYNTH_LANES],
            lane_mute: [false; SYNTH_LANES],
            gain: 0.7,
            enabled: false,
            scratch: vec![0.0; block_size * 2],
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn voice(&self, lane: usize) -> Option<&SynthVoice> {
        self.voices.get(lane)
    }

    fn lane_index(lane: usize) -> Result<usize, ControlError> {
        if lane < SYNTH_LANES {
            Ok(lane)
        } else {
            Err(ControlError::SynthLaneOutOfRange(lane))
        }
    }

    pub fn apply(&mut self, cmd: SynthCommand) -> Result<(), ControlError> {
        let finite = |v: f32, what: &'static str| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(ControlError::NonFinite(what))
            }
        };
        match cmd {
            SynthCommand::Enable(on) => self.enabled = on,
            SynthCommand::Gain(g) => self.gain = finite(g, "synth gain")?.clamp(0.0, 2.0),
            SynthCommand::LaneGain { lane, gain } => {
                self.lane_gain[Self::lane_index(lane)?] = finite(gain, "synth lane gain")?.clamp(0.0, 2.0);
            }
            SynthCommand::LanePan { lane, pan } => {
                self.lane_pan[Self::lane_index(lane)?] = finite(pan, "synth lane pan")?.clamp(-1.0, 1.0);
            }
            SynthCommand::LaneMute { lane, muted } => self.lane_mute[Self::lane_index(lane)?] = muted,
            SynthCommand::Pattern { lane, pattern } => self.voices[Self::lane_index(lane)?].set_pattern(&pattern),
            SynthCommand::Patch { lane, param } => self.voices[Self::lane_index(lane)?].patch_mut().apply(param)?,
        }
        Ok(())
    }

    /// Render all unmuted lanes and add them into `out`
    pub fn render_into(&mut self, abs_sample: u64, bpm: f64, out: &mut [f32]) {
        if !self.enabled {
            return;
        }
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), 0.0);
        }
        let scratch = &mut self.scratch[..out.len()];

        for (i, voice) in self.voices.iter_mut().enumerate() {
            if self.lane_mute[i] {
                continue;
            }
            voice.render(abs_sample, bpm, scratch);

            let gain = self.lane_gain[i] * self.gain;
            let pan = self.lane_pan[i];
            let left = gain * (1.0 - pan).min(1.0);
            let right = gain * (1.0 + pan).min(1.0);
            for (dst, src) in out.chunks_exact_mut(2).zip(scratch.chunks_exact(2)) {
                dst[0] += src[0] * left;
                dst[1] += src[1] * right;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_and_note_names() {
        assert!((midi_to_hz(69) - 440.0).abs() < 1e-3);
        assert!((midi_to_hz(81) - 880.0).abs() < 1e-2);
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("a4"), Some(69));
        assert_eq!(note_to_midi("F#3"), Some(54));
        assert_eq!(note_to_midi("Bb2"), Some(46));
        assert_eq!(note_to_midi("C-1"), Some(0));
        assert_eq!(note_to_midi("~"), None);
        assert_eq!(note_to_midi("REST"), None);
        assert_eq!(note_to_midi("H2"), None);
        assert_eq!(note_to_midi("E#4"), None);
        assert_eq!(parse_note_pattern("C4 ~ R g#5"), vec![Some(60), None, None, Some(80)]);
    }

    #[test]
    fn test_oscillator_names() {
        assert_eq!(Oscillator::from_name("Sine"), Some(Oscillator::Sine));
        assert_eq!(Oscillator::from_name("triangle"), None);
    }

    #[test]
    fn test_patch_clamping() {
        let mut patch = SynthPatch::default();
        patch.apply(PatchParam::Sustain(4.0)).unwrap();
        assert_eq!(patch.sustain, 1.0);
        patch.apply(PatchParam::Attack(-1.0)).unwrap();
        assert_eq!(patch.attack, 0.0);
        assert!(patch.apply(PatchParam::Cutoff(f32::NAN)).is_err());
    }

    #[test]
    fn test_empty_pattern_is_silent() {
        let mut voice = SynthVoice::new(44100);
        let mut out = vec![1.0f32; 256];
        voice.render(0, 120.0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_steps_advance_and_gate() {
        let mut voice = SynthVoice::new(44100);
        voice.set_pattern("C4 ~ E4 G4");
        let step = voice.samples_per_step(120.0);
        assert_eq!(step, 5513);

        let mut out = vec![0.0f32; 64];
        // First block only latches the grid position
        voice.render(0, 120.0, &mut out);
        assert_eq!(voice.step_index(), 0);
        assert!(!voice.is_gated());

        voice.render(step, 120.0, &mut out);
        assert_eq!(voice.step_index(), 1);
        assert!(!voice.is_gated());

        voice.render(2 * step, 120.0, &mut out);
        assert_eq!(voice.step_index(), 2);
        assert!(voice.is_gated());
        assert_eq!(voice.note(), Some(64));

        // Skipping two steps at once
        voice.render(4 * step, 120.0, &mut out);
        assert_eq!(voice.step_index(), 0);
        assert_eq!(voice.note(), Some(60));
    }

    #[test]
    fn test_gated_note_produces_sound_then_releases() {
        let mut voice = SynthVoice::new(44100);
        voice.set_pattern("A4 ~");
        let step = voice.samples_per_step(120.0);
        let mut out = vec![0.0f32; 2048];

        voice.render(0, 120.0, &mut out);
        voice.render(step, 120.0, &mut out);
        assert!(!voice.is_gated());
        voice.render(2 * step, 120.0, &mut out);
        assert!(voice.is_gated());
        voice.render(2 * step + 1024, 120.0, &mut out);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.05, "peak {}", peak);

        // Rest step: envelope releases to silence within the release time
        voice.render(3 * step, 120.0, &mut out);
        assert!(!voice.is_gated());
        let mut tail = vec![0.0f32; 16384];
        voice.render(3 * step + 1024, 120.0, &mut tail);
        assert!(tail[tail.len() - 2].abs() < 1e-3);
    }

    #[test]
    fn test_rack_disabled_and_muted() {
        let mut rack = SynthRack::new(44100, 256);
        rack.apply(SynthCommand::Pattern {
            lane: 0,
            pattern: "C4 C4 C4 C4".into(),
        })
        .unwrap();
        rack.apply(SynthCommand::Patch {
            lane: 0,
            param: PatchParam::Oscillator(Oscillator::Square),
        })
        .unwrap();

        let step = 5513;
        let mut out = vec![0.0f32; 512];
        rack.render_into(0, 120.0, &mut out);
        rack.render_into(step, 120.0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        rack.apply(SynthCommand::Enable(true)).unwrap();
        rack.apply(SynthCommand::LaneMute { lane: 0, muted: true }).unwrap();
        rack.render_into(2 * step, 120.0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        rack.apply(SynthCommand::LaneMute { lane: 0, muted: false }).unwrap();
        // The first block after unmuting latches the grid, the next one steps
        rack.render_into(3 * step, 120.0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        rack.render_into(4 * step, 120.0, &mut out);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_rack_pan_hard_left() {
        let mut rack = SynthRack::new(44100, 512);
        rack.apply(SynthCommand::Enable(true)).unwrap();
        rack.apply(SynthCommand::Pattern {
            lane: 1,
            pattern: "A4".into(),
        })
        .unwrap();
        rack.apply(SynthCommand::LanePan { lane: 1, pan: -1.0 }).unwrap();

        let mut out = vec![0.0f32; 1024];
        rack.render_into(0, 120.0, &mut out);
        rack.render_into(6000, 120.0, &mut out);
        assert!(out.chunks(2).all(|f| f[1] == 0.0));
        assert!(out.chunks(2).any(|f| f[0] != 0.0));
    }

    #[test]
    fn test_rack_rejects_bad_lane() {
        let mut rack = SynthRack::new(44100, 64);
        assert_eq!(
            rack.apply(SynthCommand::LaneGain { lane: 5, gain: 1.0 }),
            Err(ControlError::SynthLaneOutOfRange(5))
        );
        rack.apply(SynthCommand::Gain(9.0)).unwrap();
        assert_eq!(rack.gain(), 2.0);
    }
}
