//! Typed control messages accepted by the engine

use std::fmt;
use std::sync::Arc;

use crate::clips::{SceneBank, NUM_SLOTS};
use crate::error::ControlError;
use crate::mixer::NUM_SCENES;
use crate::stems::NUM_LANES;
use crate::synth::{Oscillator, SYNTH_LANES};

/// One of the two playback decks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub const ALL: [DeckId; 2] = [DeckId::A, DeckId::B];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }

    pub fn other(self) -> DeckId {
        match self {
            DeckId::A => DeckId::B,
            DeckId::B => DeckId::A,
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

/// Continuous and switch parameters of one lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaneParam {
    /// Linear gain, >= 0
    Gain(f32),
    /// Gain in decibels, converted to linear
    GainDb(f32),
    /// -1 (left) to 1 (right)
    Pan(f32),
    Mute(bool),
    Solo(bool),
    /// High-pass cutoff in Hz (<= 20 bypasses)
    HighPass(f32),
    /// Low-pass cutoff in Hz (>= 19000 bypasses)
    LowPass(f32),
    SendReverb(f32),
    SendDelay(f32),
}

/// Deck-independent mixer parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixerParam {
    MasterGain(f32),
    /// 0 = deck A only, 1 = deck B only
    Crossfade(f32),
    /// 0 = whole mix only, 1 = recombined lanes only
    StemBlend(f32),
    ClipOnly(DeckId, bool),
    SceneA(usize),
    SceneB(usize),
    SceneMorph(f32),
}

/// Unit for transport jumps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpUnit {
    Beats,
    Bars,
}

/// Synth patch parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatchParam {
    Oscillator(Oscillator),
    Amplitude(f32),
    Attack(f32),
    Decay(f32),
    Sustain(f32),
    Release(f32),
    Cutoff(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthCommand {
    Enable(bool),
    Gain(f32),
    LaneGain { lane: usize, gain: f32 },
    LanePan { lane: usize, pan: f32 },
    LaneMute { lane: usize, muted: bool },
    Pattern { lane: usize, pattern: String },
    Patch { lane: usize, param: PatchParam },
}

impl SynthCommand {
    fn lane(&self) -> Option<usize> {
        match self {
            SynthCommand::LaneGain { lane, .. }
            | SynthCommand::LanePan { lane, .. }
            | SynthCommand::LaneMute { lane, .. }
            | SynthCommand::Pattern { lane, .. }
            | SynthCommand::Patch { lane, .. } => Some(*lane),
            SynthCommand::Enable(_) | SynthCommand::Gain(_) => None,
        }
    }
}

/// Optional per-lane audio handed to a deck once stems are ready
pub type LaneBuffers = [Option<Arc<Vec<f32>>>; NUM_LANES];

/// Commands sent to the audio engine
#[derive(Debug, Clone)]
pub enum AudioCommand {
    // Transport
    Play(DeckId),
    Stop(DeckId),
    Seek { deck: DeckId, position: i64 },
    /// Applies to both transports
    SetBpm(f64),
    Nudge { deck: DeckId, samples: i64 },
    Bend { deck: DeckId, speed: f64 },
    Jump { deck: DeckId, unit: JumpUnit, amount: f64 },
    Beatmatch { source: DeckId, target: DeckId },
    SetLoop { deck: DeckId, start: u64, end: u64 },
    SetLooping { deck: DeckId, looping: bool },

    // Mixer (applied on the control thread)
    SetLane { deck: DeckId, lane: usize, param: LaneParam },
    SetMixer(MixerParam),
    StoreScene(usize),

    // Clips
    /// `None` queues a stop
    QueueClip { deck: DeckId, lane: usize, slot: Option<usize> },
    TriggerScene { deck: DeckId, scene: usize },
    SelectScene { deck: DeckId, bank: SceneBank, scene: usize, launch: bool },
    SetPattern { deck: DeckId, lane: usize, pattern: String },
    ClearPatterns(DeckId),
    SetPage { deck: DeckId, page: usize },

    // Buffers (Arc to avoid copying sample data through channels)
    LoadDeck { deck: DeckId, mix: Arc<Vec<f32>> },
    LoadStems { deck: DeckId, lanes: Box<LaneBuffers> },
    /// The loader finished the overview envelope for the current track
    WaveformReady(DeckId),

    Synth(SynthCommand),

    Shutdown,
}

impl AudioCommand {
    /// Whether the command only touches the shared mixer parameters
    pub fn is_mixer(&self) -> bool {
        matches!(
            self,
            AudioCommand::SetLane { .. } | AudioCommand::SetMixer(_) | AudioCommand::StoreScene(_)
        )
    }

    /// Index and number checks that need no engine state
    pub fn validate(&self) -> Result<(), ControlError> {
        match self {
            AudioCommand::SetBpm(bpm) => finite_f64(*bpm, "bpm"),
            AudioCommand::Bend { speed, .. } => finite_f64(*speed, "speed"),
            AudioCommand::Jump { amount, .. } => finite_f64(*amount, "jump amount"),
            AudioCommand::SetLoop { start, end, .. } if end <= start => Err(ControlError::EmptyLoop {
                start: *start,
                end: *end,
            }),
            AudioCommand::SetLane { lane, .. } | AudioCommand::SetPattern { lane, .. } => check_lane(*lane),
            AudioCommand::QueueClip { lane, slot, .. } => {
                check_lane(*lane)?;
                match slot {
                    Some(s) if *s >= NUM_SLOTS => Err(ControlError::SlotOutOfRange(*s)),
                    _ => Ok(()),
                }
            }
            AudioCommand::TriggerScene { scene, .. } | AudioCommand::SelectScene { scene, .. } => {
                check_slot_scene(*scene)
            }
            AudioCommand::StoreScene(scene) => check_slot_scene(*scene),
            AudioCommand::SetMixer(MixerParam::SceneA(scene) | MixerParam::SceneB(scene)) => {
                check_slot_scene(*scene)
            }
            AudioCommand::LoadDeck { mix, .. } if mix.len() % 2 != 0 => Err(ControlError::NotStereo(mix.len())),
            AudioCommand::Synth(cmd) => match cmd.lane() {
                Some(lane) if lane >= SYNTH_LANES => Err(ControlError::SynthLaneOutOfRange(lane)),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

fn finite_f64(value: f64, what: &'static str) -> Result<(), ControlError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ControlError::NonFinite(what))
    }
}

fn check_lane(lane: usize) -> Result<(), ControlError> {
    if lane < NUM_LANES {
        Ok(())
    } else {
        Err(ControlError::LaneOutOfRange(lane))
    }
}

fn check_slot_scene(scene: usize) -> Result<(), ControlError> {
    if scene < NUM_SCENES {
        Ok(())
    } else {
        Err(ControlError::SceneOutOfRange(scene))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_index_and_other() {
        assert_eq!(DeckId::A.index(), 0);
        assert_eq!(DeckId::B.index(), 1);
        assert_eq!(DeckId::A.other(), DeckId::B);
        assert_eq!(DeckId::B.to_string(), "B");
    }

    #[test]
    fn test_mixer_commands_are_routed_separately() {
        assert!(AudioCommand::StoreScene(0).is_mixer());
        assert!(AudioCommand::SetMixer(MixerParam::Crossfade(0.5)).is_mixer());
        assert!(!AudioCommand::Play(DeckId::A).is_mixer());
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let bad_lane = AudioCommand::QueueClip {
            deck: DeckId::A,
            lane: 8,
            slot: Some(0),
        };
        assert_eq!(bad_lane.validate(), Err(ControlError::LaneOutOfRange(8)));

        let bad_slot = AudioCommand::QueueClip {
            deck: DeckId::A,
            lane: 0,
            slot: Some(9),
        };
        assert_eq!(bad_slot.validate(), Err(ControlError::SlotOutOfRange(9)));

        let stop = AudioCommand::QueueClip {
            deck: DeckId::B,
            lane: 7,
            slot: None,
        };
        assert!(stop.validate().is_ok());

        let synth = AudioCommand::Synth(SynthCommand::LaneMute { lane: 2, muted: true });
        assert_eq!(synth.validate(), Err(ControlError::SynthLaneOutOfRange(2)));
    }

    #[test]
    fn test_validate_rejects_non_finite_and_empty_loop() {
        assert!(AudioCommand::SetBpm(f64::NAN).validate().is_err());
        let empty = AudioCommand::SetLoop {
            deck: DeckId::A,
            start: 100,
            end: 100,
        };
        assert_eq!(empty.validate(), Err(ControlError::EmptyLoop { start: 100, end: 100 }));
        let odd = AudioCommand::LoadDeck {
            deck: DeckId::A,
            mix: Arc::new(vec![0.0; 3]),
        };
        assert_eq!(odd.validate(), Err(ControlError::NotStereo(3)));
    }
}
