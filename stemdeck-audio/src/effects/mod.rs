//! Audio effects: lane filters, shared send effects and the master compressor

mod compressor;
mod delay;
mod filter;
mod reverb;

pub use compressor::Compressor;
pub use delay::Delay;
pub use filter::{FilterType, LaneFilter, HP_BYPASS_HZ, LP_BYPASS_HZ};
pub use reverb::Reverb;

use crate::config::EffectsConfig;

/// Trait for audio effects
pub trait Effect: Send {
    /// Process audio samples in place (stereo interleaved)
    fn process(&mut self, samples: &mut [f32]);

    /// Reset effect state
    fn reset(&mut self);
}

/// Reverb and delay units shared by both decks' send buses
///
/// Either unit may be absent; an absent unit makes its send inert.
pub struct SendEffects {
    pub reverb: Option<Reverb>,
    pub delay: Option<Delay>,
}

impl SendEffects {
    pub fn new(config: &EffectsConfig, sample_rate: u32) -> Self {
        if !config.enabled {
            return Self::none();
        }

        let mut reverb = Reverb::new(sample_rate);
        reverb.set_room_size(config.reverb_room);

        let mut delay = Delay::new(sample_rate);
        delay.set_delay_secs(config.delay_secs);
        delay.set_feedback(config.delay_feedback);

        Self {
            reverb: Some(reverb),
            delay: Some(delay),
        }
    }

    pub fn none() -> Self {
        Self {
            reverb: None,
            delay: None,
        }
    }

    /// Drop any ringing tails
    pub fn reset(&mut self) {
        if let Some(reverb) = self.reverb.as_mut() {
            reverb.reset();
        }
        if let Some(delay) = self.delay.as_mut() {
            delay.reset();
        }
    }
}

/// Build the master compressor, if effects are enabled
pub fn master_compressor(config: &EffectsConfig, sample_rate: u32) -> Option<Compressor> {
    if !config.enabled {
        return None;
    }
    let mut comp = Compressor::new(sample_rate as f32);
    comp.set_threshold(config.compressor_threshold_db);
    comp.set_ratio(config.compressor_ratio);
    comp.set_attack_ms(1.0);
    comp.set_release_ms(100.0);
    Some(comp)
}

/// Replace NaN and infinities with silence, returning how many were replaced
pub fn sanitize(samples: &mut [f32]) -> usize {
    let mut replaced = 0;
    for s in samples.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
            replaced += 1;
        }
    }
    replaced
}
