//! Track loading for stemdeck - decoding, stems, waveforms and config
//!
//! Everything here runs off the audio thread and hands finished buffers
//! to the engine as `LoadDeck` / `LoadStems` commands.

mod config;
mod loader;
mod stems;
mod waveform;
mod worker;

pub use config::{Config, ConfigError};
pub use loader::{resample_stereo, to_stereo, LoadError, LoadedTrack, TrackLoader, TrackMetadata};
pub use stems::{derive_lanes, fit_length, lane_buffers, load_cached_stems, stems_dir_for, Stems, STEM_NAMES};
pub use waveform::{compute_waveform, waveform_points, Waveform};
pub use worker::{LoadRequest, LoadWorker, LoaderEvent};
