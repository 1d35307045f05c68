//! Engine construction parameters

/// Fixed engine sample rate; decoded audio is resampled to this
pub const ENGINE_SAMPLE_RATE: u32 = 44100;

/// Shared send and master effect settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectsConfig {
    /// When false no reverb, delay or compressor is built and sends are inert
    pub enabled: bool,
    pub reverb_room: f32,
    pub delay_secs: f32,
    pub delay_feedback: f32,
    pub compressor_threshold_db: f32,
    pub compressor_ratio: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reverb_room: 0.8,
            delay_secs: 0.375,
            delay_feedback: 0.4,
            compressor_threshold_db: -1.0,
            compressor_ratio: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames per render block
    pub block_size: usize,
    /// Maximum commands drained before each block
    pub command_batch: usize,
    /// Minimum spacing of status snapshots
    pub status_interval_ms: u64,
    pub effects: EffectsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: ENGINE_SAMPLE_RATE,
            block_size: 2048,
            command_batch: 64,
            status_interval_ms: 50,
            effects: EffectsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Status interval expressed in frames, never zero
    pub fn status_interval_frames(&self) -> usize {
        let frames = self.sample_rate as u64 * self.status_interval_ms / 1000;
        (frames as usize).max(1)
    }
}
