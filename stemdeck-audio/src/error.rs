//! Error types for the control and render paths

use crate::commands::DeckId;
use thiserror::Error;

/// Rejected control command
///
/// Returned at the command boundary; the engine keeps running and the
/// control loop reports the message on the event channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("lane {0} out of range (expected 0-7)")]
    LaneOutOfRange(usize),
    #[error("slot {0} out of range (expected 0-7)")]
    SlotOutOfRange(usize),
    #[error("scene {0} out of range (expected 0-7)")]
    SceneOutOfRange(usize),
    #[error("synth lane {0} out of range")]
    SynthLaneOutOfRange(usize),
    #[error("{0} must be a finite number")]
    NonFinite(&'static str),
    #[error("deck {0} has no track loaded")]
    NoTrack(DeckId),
    #[error("buffer of {0} samples is not interleaved stereo")]
    NotStereo(usize),
    #[error("lane {lane} has {got} frames, mix has {expected}")]
    LaneLengthMismatch {
        lane: usize,
        got: usize,
        expected: usize,
    },
    #[error("loop region {start}..{end} is empty")]
    EmptyLoop { start: u64, end: u64 },
    #[error("render queue full, dropped command")]
    QueueFull,
    #[error("engine disconnected")]
    Disconnected,
}

/// Fault raised inside one render block
///
/// Never leaves the audio callback: the block is replaced by silence and
/// the fault is counted in the engine status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFault {
    #[error("output buffer of {0} samples is not interleaved stereo")]
    OddOutput(usize),
    #[error("render step panicked")]
    Panicked,
}
