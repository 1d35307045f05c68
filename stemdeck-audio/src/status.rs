//! Periodic engine status published to the control side

use crate::clips::{PendingClip, SlotIndex};
use crate::stems::NUM_LANES;
use crate::transport::BeatInfo;

/// Snapshot of one deck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckStatus {
    pub loaded: bool,
    /// Increments each time a track is installed
    pub load_count: u64,
    /// Overview envelope of the current track is available
    pub waveform_ready: bool,
    pub playing: bool,
    /// Frames
    pub playhead: u64,
    /// Track length in frames
    pub length: u64,
    pub bpm: f64,
    pub speed: f64,
    pub looping: bool,
    pub beat: BeatInfo,
    pub stems_ready: bool,
    pub active_clips: [Option<SlotIndex>; NUM_LANES],
    pub pending_clips: [PendingClip; NUM_LANES],
    pub clip_playheads: [usize; NUM_LANES],
    pub current_page: usize,
    pub scene_a: SlotIndex,
    pub scene_b: SlotIndex,
}

/// Snapshot of the whole engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStatus {
    pub decks: [DeckStatus; 2],
    /// Output underruns reported by the audio device
    pub xrun_count: u64,
    /// Blocks replaced by silence after a render fault
    pub render_faults: u64,
    /// Non-finite samples replaced by zero
    pub sanitized_samples: u64,
    /// Commands the render thread could not apply
    pub rejected_commands: u64,
    pub synth_enabled: bool,
}
