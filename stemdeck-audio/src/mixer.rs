//! Shared mixer parameters, scene snapshots and the deck crossfade
//!
//! `MixParameters` is written from the control thread and read by the
//! render thread through `snapshot()`, which copies everything a block
//! needs under one short lock. No DSP ever runs under the lock.

use std::f32::consts::FRAC_PI_2;

use parking_lot::Mutex;

use crate::commands::{DeckId, LaneParam, MixerParam};
use crate::error::ControlError;
use crate::stems::NUM_LANES;

pub const NUM_SCENES: usize = 8;

/// Live parameters of one lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneState {
    pub gain: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub hp_cutoff: f32,
    pub lp_cutoff: f32,
    pub send_reverb: f32,
    pub send_delay: f32,
}

impl Default for LaneState {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            hp_cutoff: 0.0,
            lp_cutoff: 20000.0,
            send_reverb: 0.0,
            send_delay: 0.0,
        }
    }
}

/// Continuous lane parameters as the render step consumes them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneConfig {
    pub gain: f32,
    pub pan: f32,
    pub hp_cutoff: f32,
    pub lp_cutoff: f32,
    pub send_reverb: f32,
    pub send_delay: f32,
}

impl LaneConfig {
    fn lerp(a: &LaneConfig, b: &LaneConfig, x: f32) -> LaneConfig {
        let mix = |p: f32, q: f32| p * (1.0 - x) + q * x;
        LaneConfig {
            gain: mix(a.gain, b.gain),
            pan: mix(a.pan, b.pan),
            hp_cutoff: mix(a.hp_cutoff, b.hp_cutoff),
            lp_cutoff: mix(a.lp_cutoff, b.lp_cutoff),
            send_reverb: mix(a.send_reverb, b.send_reverb),
            send_delay: mix(a.send_delay, b.send_delay),
        }
    }
}

impl From<&LaneState> for LaneConfig {
    fn from(lane: &LaneState) -> Self {
        Self {
            gain: lane.gain,
            pan: lane.pan,
            hp_cutoff: lane.hp_cutoff,
            lp_cutoff: lane.lp_cutoff,
            send_reverb: lane.send_reverb,
            send_delay: lane.send_delay,
        }
    }
}

/// Stored continuous lane parameters for both decks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSnapshot {
    pub decks: [[LaneConfig; NUM_LANES]; 2],
}

/// Immutable per-block mixer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSnapshot {
    /// Per deck, per lane; gain is 0 for inaudible lanes
    pub lanes: [[LaneConfig; NUM_LANES]; 2],
    pub master_gain: f32,
    pub crossfade: f32,
    pub stem_blend: f32,
    pub clip_only: [bool; 2],
}

impl MixSnapshot {
    pub fn lanes(&self, deck: DeckId) -> &[LaneConfig; NUM_LANES] {
        &self.lanes[deck.index()]
    }
}

#[derive(Debug, Clone)]
struct MixState {
    lanes: [[LaneState; NUM_LANES]; 2],
    master_gain: f32,
    crossfade: f32,
    stem_blend: f32,
    clip_only: [bool; 2],
    scene_a: usize,
    scene_b: usize,
    scene_morph: f32,
    scenes: [Option<SceneSnapshot>; NUM_SCENES],
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            lanes: [[LaneState::default(); NUM_LANES]; 2],
            master_gain: 1.0,
            crossfade: 0.0,
            stem_blend: 1.0,
            clip_only: [false; 2],
            scene_a: 0,
            scene_b: 1,
            scene_morph: 0.0,
            scenes: [None; NUM_SCENES],
        }
    }
}

fn finite(value: f32, what: &'static str) -> Result<f32, ControlError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ControlError::NonFinite(what))
    }
}

fn scene_index(index: usize) -> Result<usize, ControlError> {
    if index < NUM_SCENES {
        Ok(index)
    } else {
        Err(ControlError::SceneOutOfRange(index))
    }
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Lock-protected mixer parameter store
#[derive(Debug, Default)]
pub struct MixParameters {
    state: Mutex<MixState>,
}

impl MixParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one lane parameter; out-of-range values are clamped
    pub fn set_lane(&self, deck: DeckId, lane: usize, param: LaneParam) -> Result<(), ControlError> {
        if lane >= NUM_LANES {
            return Err(ControlError::LaneOutOfRange(lane));
        }
        // Validate before locking
        let param = match param {
            LaneParam::Gain(g) => LaneParam::Gain(finite(g, "lane gain")?.max(0.0)),
            LaneParam::GainDb(db) => LaneParam::Gain(db_to_linear(finite(db, "lane gain")?).max(0.0)),
            LaneParam::Pan(p) => LaneParam::Pan(finite(p, "pan")?.clamp(-1.0, 1.0)),
            LaneParam::HighPass(hz) => LaneParam::HighPass(finite(hz, "high-pass cutoff")?.max(0.0)),
            LaneParam::LowPass(hz) => LaneParam::LowPass(finite(hz, "low-pass cutoff")?.max(0.0)),
            LaneParam::SendReverb(s) => LaneParam::SendReverb(finite(s, "reverb send")?.clamp(0.0, 1.0)),
            LaneParam::SendDelay(s) => LaneParam::SendDelay(finite(s, "delay send")?.clamp(0.0, 1.0)),
            other => other,
        };

        let mut state = self.state.lock();
        let target = &mut state.lanes[deck.index()][lane];
        match param {
            LaneParam::Gain(g) | LaneParam::GainDb(g) => target.gain = g,
            LaneParam::Pan(p) => target.pan = p,
            LaneParam::Mute(m) => target.mute = m,
            LaneParam::Solo(s) => target.solo = s,
            LaneParam::HighPass(hz) => target.hp_cutoff = hz,
            LaneParam::LowPass(hz) => target.lp_cutoff = hz,
            LaneParam::SendReverb(s) => target.send_reverb = s,
            LaneParam::SendDelay(s) => target.send_delay = s,
        }
        Ok(())
    }

    /// Set a deck-independent parameter; out-of-range values are clamped
    pub fn set(&self, param: MixerParam) -> Result<(), ControlError> {
        match param {
            MixerParam::MasterGain(g) => {
                let g = finite(g, "master gain")?.clamp(0.0, 2.0);
                self.state.lock().master_gain = g;
            }
            MixerParam::Crossfade(x) => {
                let x = finite(x, "crossfade")?.clamp(0.0, 1.0);
                self.state.lock().crossfade = x;
            }
            MixerParam::StemBlend(x) => {
                let x = finite(x, "stem blend")?.clamp(0.0, 1.0);
                self.state.lock().stem_blend = x;
            }
            MixerParam::ClipOnly(deck, on) => self.state.lock().clip_only[deck.index()] = on,
            MixerParam::SceneA(idx) => {
                let idx = scene_index(idx)?;
                self.state.lock().scene_a = idx;
            }
            MixerParam::SceneB(idx) => {
                let idx = scene_index(idx)?;
                self.state.lock().scene_b = idx;
            }
            MixerParam::SceneMorph(x) => {
                let x = finite(x, "scene morph")?.clamp(0.0, 1.0);
                self.state.lock().scene_morph = x;
            }
        }
        Ok(())
    }

    /// Store the live continuous lane parameters of both decks into scene `idx`
    pub fn store_scene(&self, idx: usize) -> Result<(), ControlError> {
        let idx = scene_index(idx)?;
        let mut state = self.state.lock();
        let decks = [0, 1].map(|d| std::array::from_fn(|lane| LaneConfig::from(&state.lanes[d][lane])));
        state.scenes[idx] = Some(SceneSnapshot { decks });
        Ok(())
    }

    pub fn scene(&self, idx: usize) -> Option<SceneSnapshot> {
        self.state.lock().scenes.get(idx).copied().flatten()
    }

    pub fn lane(&self, deck: DeckId, lane: usize) -> Option<LaneState> {
        self.state.lock().lanes[deck.index()].get(lane).copied()
    }

    /// Copy out the configuration for one render block
    pub fn snapshot(&self) -> MixSnapshot {
        let state = self.state.lock();

        let morph = match (state.scenes[state.scene_a], state.scenes[state.scene_b]) {
            (Some(a), Some(b)) => Some((a, b, state.scene_morph.clamp(0.0, 1.0))),
            _ => None,
        };

        let mut lanes = [[LaneConfig::from(&LaneState::default()); NUM_LANES]; 2];
        for (d, deck_lanes) in state.lanes.iter().enumerate() {
            let any_solo = deck_lanes.iter().any(|l| l.solo);
            for (i, live) in deck_lanes.iter().enumerate() {
                let audible = !live.mute && (!any_solo || live.solo);
                let mut config = match &morph {
                    Some((a, b, x)) => LaneConfig::lerp(&a.decks[d][i], &b.decks[d][i], *x),
                    None => LaneConfig::from(live),
                };
                if !audible {
                    config.gain = 0.0;
                }
                lanes[d][i] = config;
            }
        }

        MixSnapshot {
            lanes,
            master_gain: state.master_gain,
            crossfade: state.crossfade.clamp(0.0, 1.0),
            stem_blend: state.stem_blend.clamp(0.0, 1.0),
            clip_only: state.clip_only,
        }
    }
}

/// Equal-power deck gains: `(cos(x*pi/2), sin(x*pi/2))`
#[inline]
pub fn equal_power_gains(crossfade: f32) -> (f32, f32) {
    let angle = crossfade.clamp(0.0, 1.0) * FRAC_PI_2;
    (angle.cos(), angle.sin())
}

/// Crossfade two interleaved deck buffers into `output` and apply master gain
pub fn mix_decks(deck_a: &[f32], deck_b: &[f32], crossfade: f32, master_gain: f32, output: &mut [f32]) {
    let (gain_a, gain_b) = equal_power_gains(crossfade);
    for ((out, a), b) in output.iter_mut().zip(deck_a).zip(deck_b) {
        *out = (a * gain_a + b * gain_b) * master_gain;
    }
}
