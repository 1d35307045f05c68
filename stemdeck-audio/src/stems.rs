//! Per-deck audio buffers and bounded frame reads
//!
//! Holds the whole-mix buffer and up to eight lane buffers (interleaved
//! stereo, engine sample rate). Reads never fail: anything past the end
//! of a buffer, or a lane that is absent, reads as silence.

use std::sync::Arc;

use crate::clips::ClipGrid;
use crate::error::ControlError;

pub const NUM_LANES: usize = 8;
pub const CHANNELS: usize = 2;

/// Display names of the eight performance lanes
pub const LANE_NAMES: [&str; NUM_LANES] = [
    "Kick",
    "Snare/Clap",
    "Hats",
    "Perc/Top",
    "Bass",
    "Chords",
    "Lead",
    "Vox",
];

/// Copy `out.len() / 2` frames starting at `start_frame`, zero-padding past the end
#[inline]
fn read_window(buffer: &[f32], start_frame: usize, out: &mut [f32]) {
    let total_frames = buffer.len() / CHANNELS;
    if start_frame >= total_frames {
        out.fill(0.0);
        return;
    }
    let frames = (out.len() / CHANNELS).min(total_frames - start_frame);
    let n = frames * CHANNELS;
    let from = start_frame * CHANNELS;
    out[..n].copy_from_slice(&buffer[from..from + n]);
    out[n..].fill(0.0);
}

pub struct StemBuffers {
    mix: Option<Arc<Vec<f32>>>,
    lanes: [Option<Arc<Vec<f32>>>; NUM_LANES],
    ready: bool,
}

impl Default for StemBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl StemBuffers {
    pub fn new() -> Self {
        Self {
            mix: None,
            lanes: Default::default(),
            ready: false,
        }
    }

    /// Install a new whole-mix buffer; clears lanes until stems arrive
    pub fn load_mix(&mut self, mix: Arc<Vec<f32>>) -> Result<(), ControlError> {
        if mix.len() % CHANNELS != 0 {
            return Err(ControlError::NotStereo(mix.len()));
        }
        self.mix = Some(mix);
        self.lanes = Default::default();
        self.ready = false;
        Ok(())
    }

    /// Install lane buffers; every present lane must match the mix length
    pub fn load_lanes(&mut self, lanes: [Option<Arc<Vec<f32>>>; NUM_LANES]) -> Result<(), ControlError> {
        let expected = self.len_frames();
        if self.mix.is_none() {
            return Err(ControlError::LaneLengthMismatch {
                lane: 0,
                got: lanes.iter().flatten().next().map_or(0, |b| b.len() / CHANNELS),
                expected,
            });
        }
        for (lane, buffer) in lanes.iter().enumerate() {
            if let Some(buffer) = buffer {
                if buffer.len() != expected * CHANNELS {
                    return Err(ControlError::LaneLengthMismatch {
                        lane,
                        got: buffer.len() / CHANNELS,
                        expected,
                    });
                }
            }
        }
        self.lanes = lanes;
        self.ready = true;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.mix.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_lane(&self, lane: usize) -> bool {
        self.lanes.get(lane).is_some_and(|l| l.is_some())
    }

    /// Track length in frames
    pub fn len_frames(&self) -> usize {
        self.mix.as_ref().map_or(0, |m| m.len() / CHANNELS)
    }

    /// Bounded read of the whole mix
    pub fn read_frame(&self, start_frame: usize, out: &mut [f32]) {
        match &self.mix {
            Some(mix) => read_window(mix, start_frame, out),
            None => out.fill(0.0),
        }
    }

    /// Fill the mix chunk and all eight lane chunks for one block
    ///
    /// Lanes with an active clip loop that clip on their own clip playhead;
    /// other lanes read at `start_frame` unless `clip_only` is set. Lane
    /// chunks stay silent until stems are ready.
    pub fn get_frame(
        &self,
        start_frame: usize,
        clip_only: bool,
        clips: &mut ClipGrid,
        mix_out: &mut [f32],
        lane_out: &mut [Vec<f32>; NUM_LANES],
    ) {
        self.read_frame(start_frame, mix_out);
        let n = mix_out.len();

        for (lane, out) in lane_out.iter_mut().enumerate() {
            let out = &mut out[..n];
            out.fill(0.0);
            if !self.ready {
                continue;
            }
            let buffer = self.lanes[lane].as_deref();

            if let Some(clip) = clips.active_clip(lane) {
                let offset = self.read_clip_loop(buffer, clip.start, clip.len(), clips.clip_playhead(lane), out);
                clips.set_clip_playhead(lane, offset);
            } else if !clip_only {
                if let Some(buffer) = buffer {
                    read_window(buffer, start_frame, out);
                }
            }
        }
    }

    /// Loop `[clip_start, clip_start + clip_len)` into `out` from `offset`,
    /// returning the offset to resume from
    fn read_clip_loop(
        &self,
        buffer: Option<&Vec<f32>>,
        clip_start: usize,
        clip_len: usize,
        offset: usize,
        out: &mut [f32],
    ) -> usize {
        if clip_len == 0 {
            return offset;
        }
        let frames = out.len() / CHANNELS;
        let mut offset = if offset >= clip_len { 0 } else { offset };
        let mut written = 0;

        while written < frames {
            let take = (frames - written).min(clip_len - offset);
            let dst = &mut out[written * CHANNELS..(written + take) * CHANNELS];
            if let Some(buffer) = buffer {
                read_window(buffer, clip_start + offset, dst);
            }
            written += take;
            offset += take;
            if offset >= clip_len {
                offset = 0;
            }
        }
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::SlotIndex;

    /// Stereo ramp whose left channel equals the frame index
    fn ramp(frames: usize) -> Arc<Vec<f32>> {
        Arc::new((0..frames).flat_map(|i| [i as f32, -(i as f32)]).collect())
    }

    fn lanes_of(buffer: &Arc<Vec<f32>>) -> [Option<Arc<Vec<f32>>>; NUM_LANES] {
        std::array::from_fn(|_| Some(Arc::clone(buffer)))
    }

    fn scratch(frames: usize) -> (Vec<f32>, [Vec<f32>; NUM_LANES]) {
        (
            vec![0.0; frames * CHANNELS],
            std::array::from_fn(|_| vec![0.0; frames * CHANNELS]),
        )
    }

    #[test]
    fn test_read_frame_zero_pads() {
        let mut stems = StemBuffers::new();
        stems.load_mix(ramp(10)).unwrap();

        let mut out = vec![9.0; 8];
        stems.read_frame(8, &mut out);
        assert_eq!(out, vec![8.0, -8.0, 9.0, -9.0, 0.0, 0.0, 0.0, 0.0]);

        stems.read_frame(50, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_load_rejects_bad_buffers() {
        let mut stems = StemBuffers::new();
        assert!(stems.load_mix(Arc::new(vec![0.0; 5])).is_err());
        assert!(stems.load_lanes(lanes_of(&ramp(4))).is_err());

        stems.load_mix(ramp(100)).unwrap();
        let mut lanes: [Option<Arc<Vec<f32>>>; NUM_LANES] = Default::default();
        lanes[3] = Some(ramp(99));
        assert_eq!(
            stems.load_lanes(lanes),
            Err(ControlError::LaneLengthMismatch {
                lane: 3,
                got: 99,
                expected: 100
            })
        );
        assert!(!stems.is_ready());
    }

    #[test]
    fn test_lanes_silent_until_ready() {
        let mut stems = StemBuffers::new();
        stems.load_mix(ramp(64)).unwrap();
        let mut clips = ClipGrid::new();
        let (mut mix, mut lanes) = scratch(16);

        stems.get_frame(4, false, &mut clips, &mut mix, &mut lanes);
        assert_eq!(mix[0], 4.0);
        assert!(lanes.iter().all(|l| l.iter().all(|&s| s == 0.0)));

        stems.load_lanes(lanes_of(&ramp(64))).unwrap();
        stems.get_frame(4, false, &mut clips, &mut mix, &mut lanes);
        assert_eq!(lanes[0][0], 4.0);
        assert_eq!(lanes[7][2], 5.0);
    }

    #[test]
    fn test_clip_only_silences_idle_lanes() {
        let mut stems = StemBuffers::new();
        stems.load_mix(ramp(64)).unwrap();
        stems.load_lanes(lanes_of(&ramp(64))).unwrap();
        let mut clips = ClipGrid::new();
        let (mut mix, mut lanes) = scratch(8);

        stems.get_frame(0, true, &mut clips, &mut mix, &mut lanes);
        assert!(lanes.iter().all(|l| l.iter().all(|&s| s == 0.0)));
        assert_eq!(mix[2], 1.0);
    }

    #[test]
    fn test_clip_loop_wraps_across_blocks() {
        let frames = 1000;
        let mut stems = StemBuffers::new();
        stems.load_mix(ramp(frames)).unwrap();
        stems.load_lanes(lanes_of(&ramp(frames))).unwrap();

        // 100-frame slots at 1 bar per slot
        let mut clips = ClipGrid::new();
        clips.set_page_with(0, frames, 100, 240.0, 1, 8);
        clips.queue_clip(0, SlotIndex::new(2).unwrap()).unwrap();
        clips.on_bar_boundary();

        let (mut mix, mut lanes) = scratch(64);
        let mut seen = Vec::new();
        for _ in 0..4 {
            stems.get_frame(0, false, &mut clips, &mut mix, &mut lanes);
            seen.extend(lanes[0].chunks(2).map(|f| f[0] as usize));
        }

        let expected: Vec<usize> = (0..256).map(|i| 200 + i % 100).collect();
        assert_eq!(seen, expected);
        assert_eq!(clips.clip_playhead(0), 56);
    }

    #[test]
    fn test_clip_loop_restartable() {
        let frames = 1000;
        let mut stems = StemBuffers::new();
        stems.load_mix(ramp(frames)).unwrap();
        stems.load_lanes(lanes_of(&ramp(frames))).unwrap();

        let mut clips = ClipGrid::new();
        clips.set_page_with(0, frames, 100, 240.0, 1, 8);
        clips.queue_clip(1, SlotIndex::new(0).unwrap()).unwrap();
        clips.on_bar_boundary();

        let (mut mix, mut lanes) = scratch(100);
        stems.get_frame(0, false, &mut clips, &mut mix, &mut lanes);
        let first = lanes[1].clone();
        stems.get_frame(500, false, &mut clips, &mut mix, &mut lanes);
        assert_eq!(lanes[1], first);
        assert_eq!(clips.clip_playhead(1), 0);
    }

    #[test]
    fn test_clip_playhead_advances_without_lane_buffer() {
        let frames = 1000;
        let mut stems = StemBuffers::new();
        stems.load_mix(ramp(frames)).unwrap();
        let mut lanes_in: [Option<Arc<Vec<f32>>>; NUM_LANES] = Default::default();
        lanes_in[0] = Some(ramp(frames));
        stems.load_lanes(lanes_in).unwrap();
        assert!(!stems.has_lane(4));

        let mut clips = ClipGrid::new();
        clips.set_page_with(0, frames, 100, 240.0, 1, 8);
        clips.queue_clip(4, SlotIndex::new(0).unwrap()).unwrap();
        clips.on_bar_boundary();

        let (mut mix, mut lanes) = scratch(30);
        stems.get_frame(0, false, &mut clips, &mut mix, &mut lanes);
        assert!(lanes[4].iter().all(|&s| s == 0.0));
        assert_eq!(clips.clip_playhead(4), 30);
    }
}
