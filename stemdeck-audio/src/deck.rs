//! Deck: one playback unit with transport, buffers, clip grid and lane DSP

use std::sync::Arc;

use crate::clips::ClipGrid;
use crate::commands::{DeckId, JumpUnit};
use crate::effects::{sanitize, Effect, LaneFilter, SendEffects};
use crate::error::ControlError;
use crate::mixer::LaneConfig;
use crate::status::DeckStatus;
use crate::stems::{StemBuffers, CHANNELS, NUM_LANES};
use crate::transport::Transport;

pub struct Deck {
    id: DeckId,
    transport: Transport,
    stems: StemBuffers,
    clips: ClipGrid,
    filters: [LaneFilter; NUM_LANES],
    // Pre-allocated block buffers (avoids allocation in audio callback)
    mix_chunk: Vec<f32>,
    lane_chunks: [Vec<f32>; NUM_LANES],
    stem_sum: Vec<f32>,
    reverb_bus: Vec<f32>,
    delay_bus: Vec<f32>,
    sanitized: u64,
    loads: u64,
    waveform_ready: bool,
}

impl Deck {
    pub fn new(id: DeckId, sample_rate: u32, block_size: usize) -> Self {
        let samples = block_size * CHANNELS;
        Self {
            id,
            transport: Transport::new(sample_rate),
            stems: StemBuffers::new(),
            clips: ClipGrid::new(),
            filters: std::array::from_fn(|_| LaneFilter::new(sample_rate as f32)),
            mix_chunk: vec![0.0; samples],
            lane_chunks: std::array::from_fn(|_| vec![0.0; samples]),
            stem_sum: vec![0.0; samples],
            reverb_bus: vec![0.0; samples],
            delay_bus: vec![0.0; samples],
            sanitized: 0,
            loads: 0,
            waveform_ready: false,
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn stems(&self) -> &StemBuffers {
        &self.stems
    }

    pub fn clips(&self) -> &ClipGrid {
        &self.clips
    }

    pub fn clips_mut(&mut self) -> &mut ClipGrid {
        &mut self.clips
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn is_loaded(&self) -> bool {
        self.stems.is_loaded()
    }

    /// Track length in frames (0 when nothing is loaded)
    pub fn len_frames(&self) -> u64 {
        self.stems.len_frames() as u64
    }

    /// Non-finite mix and lane samples replaced since creation
    pub fn sanitized_samples(&self) -> u64 {
        self.sanitized
    }

    /// Install a new track: rewinds and rebuilds clip page 0 at the current tempo
    pub fn load_mix(&mut self, mix: Arc<Vec<f32>>) -> Result<(), ControlError> {
        self.stems.load_mix(mix)?;
        self.transport.seek(0);
        for filter in &mut self.filters {
            filter.reset();
        }
        self.rebuild_page(0);
        self.loads += 1;
        self.waveform_ready = false;
        Ok(())
    }

    /// Successful `load_mix` calls since creation
    pub fn load_count(&self) -> u64 {
        self.loads
    }

    /// Flag the overview envelope of the current track as available
    pub fn mark_waveform_ready(&mut self) -> Result<(), ControlError> {
        if !self.is_loaded() {
            return Err(ControlError::NoTrack(self.id));
        }
        self.waveform_ready = true;
        Ok(())
    }

    pub fn load_lanes(&mut self, lanes: [Option<Arc<Vec<f32>>>; NUM_LANES]) -> Result<(), ControlError> {
        self.stems.load_lanes(lanes)
    }

    pub fn set_page(&mut self, page: usize) -> Result<(), ControlError> {
        if !self.is_loaded() {
            return Err(ControlError::NoTrack(self.id));
        }
        self.rebuild_page(page);
        Ok(())
    }

    fn rebuild_page(&mut self, page: usize) {
        self.clips.set_page(
            page,
            self.stems.len_frames(),
            self.transport.sample_rate(),
            self.transport.bpm(),
        );
    }

    /// Move by beats or bars from the current playhead
    pub fn jump(&mut self, unit: JumpUnit, amount: f64) {
        let beats = match unit {
            JumpUnit::Beats => amount,
            JumpUnit::Bars => amount * self.transport.beats_per_bar() as f64,
        };
        let delta = (beats * self.transport.samples_per_beat()).trunc() as i64;
        self.nudge(delta);
    }

    pub fn nudge(&mut self, samples: i64) {
        let target = (self.transport.playhead() as i64).saturating_add(samples);
        self.transport.seek(target);
    }

    fn ensure_capacity(&mut self, samples: usize) {
        if samples > self.mix_chunk.len() {
            self.mix_chunk.resize(samples, 0.0);
            for chunk in &mut self.lane_chunks {
                chunk.resize(samples, 0.0);
            }
            self.stem_sum.resize(samples, 0.0);
            self.reverb_bus.resize(samples, 0.0);
            self.delay_bus.resize(samples, 0.0);
        }
    }

    /// Render this deck's signal for one block into `out`
    ///
    /// Returns true when the block reaches the end of a non-looping track,
    /// in which case `finish_block` stops the deck at the exact end.
    /// A deck already at or past the end stops now and stays silent.
    pub fn render(
        &mut self,
        lanes: &[LaneConfig; NUM_LANES],
        clip_only: bool,
        stem_blend: f32,
        sends: &mut SendEffects,
        out: &mut [f32],
    ) -> bool {
        out.fill(0.0);
        if !self.transport.is_playing() {
            return false;
        }

        let n = out.len();
        let frames = (n / CHANNELS) as u64;
        let length = self.len_frames();
        let position = self.transport.playhead();
        let bounded = !self.transport.is_looping() && length > 0;

        if bounded && position >= length {
            self.transport.seek(length as i64);
            self.transport.stop();
            return false;
        }
        let stop_at_end = bounded && position + frames >= length;

        self.ensure_capacity(n);
        self.stems.get_frame(
            position as usize,
            clip_only,
            &mut self.clips,
            &mut self.mix_chunk[..n],
            &mut self.lane_chunks,
        );
        self.sanitized += sanitize(&mut self.mix_chunk[..n]) as u64;

        let stem_sum = &mut self.stem_sum[..n];
        let reverb_bus = &mut self.reverb_bus[..n];
        let delay_bus = &mut self.delay_bus[..n];
        stem_sum.fill(0.0);
        reverb_bus.fill(0.0);
        delay_bus.fill(0.0);

        if self.stems.is_ready() {
            for (i, cfg) in lanes.iter().enumerate() {
                let lane = &mut self.lane_chunks[i][..n];
                self.sanitized += sanitize(lane) as u64;
                self.filters[i].process(lane, cfg.hp_cutoff, cfg.lp_cutoff);

                let left = cfg.gain * (1.0 - cfg.pan).min(1.0);
                let right = cfg.gain * (1.0 + cfg.pan).min(1.0);
                for frame in lane.chunks_exact_mut(2) {
                    frame[0] *= left;
                    frame[1] *= right;
                }

                if sends.reverb.is_some() && cfg.send_reverb > 0.0 {
                    for (bus, s) in reverb_bus.iter_mut().zip(lane.iter()) {
                        *bus += s * cfg.send_reverb;
                    }
                }
                if sends.delay.is_some() && cfg.send_delay > 0.0 {
                    for (bus, s) in delay_bus.iter_mut().zip(lane.iter()) {
                        *bus += s * cfg.send_delay;
                    }
                }
                for (sum, s) in stem_sum.iter_mut().zip(lane.iter()) {
                    *sum += s;
                }
            }
        }

        if let Some(reverb) = sends.reverb.as_mut() {
            reverb.process(reverb_bus);
            for (sum, s) in stem_sum.iter_mut().zip(reverb_bus.iter()) {
                *sum += s;
            }
        }
        if let Some(delay) = sends.delay.as_mut() {
            delay.process(delay_bus);
            for (sum, s) in stem_sum.iter_mut().zip(delay_bus.iter()) {
                *sum += s;
            }
        }

        let mix = &self.mix_chunk[..n];
        for ((o, m), s) in out.iter_mut().zip(mix).zip(stem_sum.iter()) {
            *o = m * (1.0 - stem_blend) + s * stem_blend;
        }

        stop_at_end
    }

    /// Advance the transport after a block, firing the clip grid's bar
    /// transition when the bar number increases
    pub fn finish_block(&mut self, frames: usize, stop_at_end: bool) {
        if !self.transport.is_playing() {
            return;
        }
        let bar_before = self.transport.beat_info().bar;
        self.transport.advance(frames);
        if self.transport.beat_info().bar > bar_before {
            self.clips.on_bar_boundary();
        }

        if stop_at_end {
            let length = self.len_frames();
            if length > 0 {
                self.transport.seek(length as i64);
            }
            self.transport.stop();
        }
    }

    pub fn status(&self) -> DeckStatus {
        let lane = |i: usize| self.clips.lane(i);
        DeckStatus {
            loaded: self.is_loaded(),
            load_count: self.loads,
            waveform_ready: self.waveform_ready,
            playing: self.transport.is_playing(),
            playhead: self.transport.playhead(),
            length: self.len_frames(),
            bpm: self.transport.bpm(),
            speed: self.transport.speed(),
            looping: self.transport.is_looping(),
            beat: self.transport.beat_info(),
            stems_ready: self.stems.is_ready(),
            active_clips: std::array::from_fn(|i| lane(i).and_then(|l| l.active)),
            pending_clips: std::array::from_fn(|i| lane(i).map(|l| l.pending).unwrap_or_default()),
            clip_playheads: std::array::from_fn(|i| lane(i).map_or(0, |l| l.playhead)),
            current_page: self.clips.current_page(),
            scene_a: self.clips.scene_a(),
            scene_b: self.clips.scene_b(),
        }
    }
}
