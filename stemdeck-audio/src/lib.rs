//! Render engine for stemdeck - two stem-aware decks with a clip session view
//!
//! This crate provides the real-time pipeline and its state machines:
//! - Transport: playhead, tempo, loop region and bar/beat position
//! - Deck: stem buffers, clip grid and per-lane filters for one deck
//! - Mixer: shared lane parameters, scenes and the per-block snapshot
//! - Synth: step-sequenced rack clocked by the playing deck
//! - Engine: the per-block render step and the control loop feeding it

mod clips;
mod commands;
mod config;
mod control;
mod deck;
mod effects;
mod engine;
mod error;
mod mixer;
mod status;
mod stems;
mod synth;
mod transport;

pub use clips::{bar_samples, parse_clip_pattern, Clip, ClipGrid, LaneClipState, PendingClip, SceneBank, SlotIndex, NUM_SLOTS};
pub use commands::{AudioCommand, DeckId, JumpUnit, LaneBuffers, LaneParam, MixerParam, PatchParam, SynthCommand};
pub use config::{EffectsConfig, EngineConfig, ENGINE_SAMPLE_RATE};
pub use control::{apply_mixer_command, ControlLoop};
pub use deck::Deck;
pub use effects::{sanitize, Compressor, Delay, Effect, FilterType, LaneFilter, Reverb, SendEffects};
pub use engine::{beatmatch, render_link, AudioEngine, AudioEvent, ControlLink, EngineState, RenderLink};
pub use error::{ControlError, RenderFault};
pub use mixer::{db_to_linear, equal_power_gains, mix_decks, LaneConfig, LaneState, MixParameters, MixSnapshot, SceneSnapshot, NUM_SCENES};
pub use status::{DeckStatus, EngineStatus};
pub use stems::{StemBuffers, CHANNELS, LANE_NAMES, NUM_LANES};
pub use synth::{midi_to_hz, note_to_midi, parse_note_pattern, Oscillator, SynthPatch, SynthRack, SynthVoice, SYNTH_LANES};
pub use transport::{BeatInfo, Transport, BEATS_PER_BAR, DEFAULT_BPM, MAX_BPM, MAX_SPEED, MIN_BPM, MIN_SPEED};
