//! Session-view clip grid: paging, bar-quantized launching and patterns
//!
//! Each deck owns an 8x8 grid of clip regions over its lane buffers.
//! Launch and stop requests are queued and only take effect when the
//! deck's transport crosses a bar line (`on_bar_boundary`).

use crate::error::ControlError;
use crate::stems::NUM_LANES;

pub const NUM_SLOTS: usize = 8;
pub const DEFAULT_BARS_PER_SLOT: usize = 8;

const FALLBACK_SAMPLE_RATE: u32 = 44100;
const FALLBACK_BPM: f64 = 120.0;

/// Slot (and scene) index, always within 0-7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn new(index: usize) -> Result<Self, ControlError> {
        if index < NUM_SLOTS {
            Ok(Self(index as u8))
        } else {
            Err(ControlError::SlotOutOfRange(index))
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Request waiting for the next bar line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingClip {
    #[default]
    None,
    Stop,
    Launch(SlotIndex),
}

/// Which of the two selected scenes a selection targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneBank {
    A,
    B,
}

/// A loopable region of one lane's buffer, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub lane: usize,
    pub slot: SlotIndex,
    pub start: usize,
    pub end: usize,
    pub color: [u8; 3],
}

impl Clip {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> String {
        format!("Clip {}-{}", self.lane + 1, self.slot.index() + 1)
    }
}

/// Playback state of one lane
#[derive(Debug, Clone, Default)]
pub struct LaneClipState {
    pub active: Option<SlotIndex>,
    pub pending: PendingClip,
    /// Offset inside the active clip
    pub playhead: usize,
    pattern: Vec<Option<SlotIndex>>,
    pattern_step: usize,
}

impl LaneClipState {
    pub fn pattern(&self) -> &[Option<SlotIndex>] {
        &self.pattern
    }

    pub fn pattern_step(&self) -> usize {
        self.pattern_step
    }
}

/// Parse a whitespace-separated pattern: `1`-`8` pick a slot, anything else rests
pub fn parse_clip_pattern(pattern: &str) -> Vec<Option<SlotIndex>> {
    pattern
        .split_whitespace()
        .map(|token| {
            token
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=NUM_SLOTS).contains(n))
                .and_then(|n| SlotIndex::new(n - 1).ok())
        })
        .collect()
}

/// Frames in one 4/4 bar
pub fn bar_samples(bpm: f64, sample_rate: u32) -> usize {
    (60.0 / bpm * 4.0 * sample_rate as f64).round() as usize
}

/// Clip grid and per-lane launch state for one deck
#[derive(Debug, Clone)]
pub struct ClipGrid {
    grid: [[Option<Clip>; NUM_SLOTS]; NUM_LANES],
    lanes: [LaneClipState; NUM_LANES],
    scene_a: SlotIndex,
    scene_b: SlotIndex,
    current_page: usize,
    bars_per_slot: usize,
    slots_per_page: usize,
}

impl Default for ClipGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipGrid {
    pub fn new() -> Self {
        Self {
            grid: [[None; NUM_SLOTS]; NUM_LANES],
            lanes: std::array::from_fn(|_| LaneClipState::default()),
            scene_a: SlotIndex(0),
            scene_b: SlotIndex(1),
            current_page: 0,
            bars_per_slot: DEFAULT_BARS_PER_SLOT,
            slots_per_page: NUM_SLOTS,
        }
    }

    /// Rebuild the grid for `page` with default slot sizing
    pub fn set_page(&mut self, page: usize, total_samples: usize, sample_rate: u32, bpm: f64) {
        self.set_page_with(page, total_samples, sample_rate, bpm, DEFAULT_BARS_PER_SLOT, NUM_SLOTS);
    }

    /// Rebuild the grid so slot `s` covers
    /// `[(page * slots_per_page + s) * slot_len, +slot_len)` clipped to the track.
    ///
    /// Resets active, pending and clip playheads; patterns survive.
    pub fn set_page_with(
        &mut self,
        page: usize,
        total_samples: usize,
        sample_rate: u32,
        bpm: f64,
        bars_per_slot: usize,
        slots_per_page: usize,
    ) {
        let sample_rate = if sample_rate == 0 { FALLBACK_SAMPLE_RATE } else { sample_rate };
        let bpm = if bpm.is_finite() && bpm > 1e-3 { bpm } else { FALLBACK_BPM };
        let bars_per_slot = if bars_per_slot == 0 { DEFAULT_BARS_PER_SLOT } else { bars_per_slot };
        let slots_per_page = if slots_per_page == 0 { NUM_SLOTS } else { slots_per_page };

        self.current_page = page;
        self.bars_per_slot = bars_per_slot;
        self.slots_per_page = slots_per_page;

        let slot_len = bar_samples(bpm, sample_rate).saturating_mul(bars_per_slot).max(1);
        for (lane, row) in self.grid.iter_mut().enumerate() {
            for (slot, cell) in row.iter_mut().enumerate() {
                // Pages past the addressable range hold no clips
                let start = page
                    .checked_mul(slots_per_page)
                    .and_then(|first| first.checked_add(slot))
                    .and_then(|index| index.checked_mul(slot_len));
                *cell = match start {
                    Some(start) if start < total_samples => Some(Clip {
                        lane,
                        slot: SlotIndex(slot as u8),
                        start,
                        end: start.saturating_add(slot_len).min(total_samples),
                        color: [255, 255, 255],
                    }),
                    _ => None,
                };
            }
        }
        self.reset_playback();
    }

    /// Clear active/pending clips and clip playheads
    pub fn reset_playback(&mut self) {
        for lane in &mut self.lanes {
            lane.active = None;
            lane.pending = PendingClip::None;
            lane.playhead = 0;
        }
    }

    pub fn clip(&self, lane: usize, slot: SlotIndex) -> Option<&Clip> {
        self.grid.get(lane).and_then(|row| row[slot.index()].as_ref())
    }

    /// Clip currently looping on `lane`, if its slot holds one
    pub fn active_clip(&self, lane: usize) -> Option<Clip> {
        let state = self.lanes.get(lane)?;
        state.active.and_then(|slot| self.grid[lane][slot.index()])
    }

    pub fn lane(&self, lane: usize) -> Option<&LaneClipState> {
        self.lanes.get(lane)
    }

    pub fn active_slot(&self, lane: usize) -> Option<SlotIndex> {
        self.lanes.get(lane).and_then(|s| s.active)
    }

    pub fn pending(&self, lane: usize) -> PendingClip {
        self.lanes.get(lane).map(|s| s.pending).unwrap_or_default()
    }

    pub fn clip_playhead(&self, lane: usize) -> usize {
        self.lanes.get(lane).map(|s| s.playhead).unwrap_or(0)
    }

    pub(crate) fn set_clip_playhead(&mut self, lane: usize, offset: usize) {
        if let Some(state) = self.lanes.get_mut(lane) {
            state.playhead = offset;
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn bars_per_slot(&self) -> usize {
        self.bars_per_slot
    }

    pub fn scene_a(&self) -> SlotIndex {
        self.scene_a
    }

    pub fn scene_b(&self) -> SlotIndex {
        self.scene_b
    }

    fn lane_mut(&mut self, lane: usize) -> Result<&mut LaneClipState, ControlError> {
        self.lanes.get_mut(lane).ok_or(ControlError::LaneOutOfRange(lane))
    }

    /// Queue `slot` to launch on `lane` at the next bar
    pub fn queue_clip(&mut self, lane: usize, slot: SlotIndex) -> Result<(), ControlError> {
        self.lane_mut(lane)?.pending = PendingClip::Launch(slot);
        Ok(())
    }

    /// Queue a stop on `lane` at the next bar
    pub fn queue_stop(&mut self, lane: usize) -> Result<(), ControlError> {
        self.lane_mut(lane)?.pending = PendingClip::Stop;
        Ok(())
    }

    /// Queue the same slot on every lane
    pub fn trigger_scene(&mut self, slot: SlotIndex) {
        for lane in &mut self.lanes {
            lane.pending = PendingClip::Launch(slot);
        }
    }

    /// Select scene A or B, optionally launching it
    pub fn select_scene(&mut self, bank: SceneBank, slot: SlotIndex, launch: bool) {
        match bank {
            SceneBank::A => self.scene_a = slot,
            SceneBank::B => self.scene_b = slot,
        }
        if launch {
            self.trigger_scene(slot);
        }
    }

    pub fn set_pattern(&mut self, lane: usize, pattern: &str) -> Result<(), ControlError> {
        let state = self.lane_mut(lane)?;
        state.pattern = parse_clip_pattern(pattern);
        state.pattern_step = 0;
        Ok(())
    }

    pub fn clear_patterns(&mut self) {
        for lane in &mut self.lanes {
            lane.pattern.clear();
            lane.pattern_step = 0;
        }
    }

    /// Advance every non-empty pattern one step, queueing the slot it names
    pub fn tick_patterns(&mut self) {
        for lane in &mut self.lanes {
            if lane.pattern.is_empty() {
                continue;
            }
            let step = lane.pattern_step % lane.pattern.len();
            if let Some(slot) = lane.pattern[step] {
                lane.pending = PendingClip::Launch(slot);
            }
            lane.pattern_step = (step + 1) % lane.pattern.len();
        }
    }

    /// Apply queued launches and stops
    pub fn resolve_pending(&mut self) {
        for lane in &mut self.lanes {
            match lane.pending {
                PendingClip::None => continue,
                PendingClip::Stop => lane.active = None,
                PendingClip::Launch(slot) => lane.active = Some(slot),
            }
            lane.playhead = 0;
            lane.pending = PendingClip::None;
        }
    }

    /// Bar-line transition: patterns first, then pending requests
    pub fn on_bar_boundary(&mut self) {
        self.tick_patterns();
        self.resolve_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(i: usize) -> SlotIndex {
        SlotIndex::new(i).unwrap()
    }

    #[test]
    fn test_slot_index_bounds() {
        assert!(SlotIndex::new(7).is_ok());
        assert_eq!(SlotIndex::new(8), Err(ControlError::SlotOutOfRange(8)));
    }

    #[test]
    fn test_parse_pattern_tokens() {
        let pattern = parse_clip_pattern("1 ~ 3 _ 8 9 x 0");
        assert_eq!(
            pattern,
            vec![Some(slot(0)), None, Some(slot(2)), None, Some(slot(7)), None, None, None]
        );
        assert!(parse_clip_pattern("   ").is_empty());
    }

    #[test]
    fn test_queue_then_bar_activates() {
        let mut grid = ClipGrid::new();
        grid.set_page(0, 10_000_000, 44100, 120.0);

        grid.queue_clip(0, slot(2)).unwrap();
        assert_eq!(grid.pending(0), PendingClip::Launch(slot(2)));
        assert_eq!(grid.active_slot(0), None);

        grid.set_clip_playhead(0, 1234);
        grid.on_bar_boundary();
        assert_eq!(grid.active_slot(0), Some(slot(2)));
        assert_eq!(grid.clip_playhead(0), 0);
        assert_eq!(grid.pending(0), PendingClip::None);
    }

    #[test]
    fn test_queue_stop() {
        let mut grid = ClipGrid::new();
        grid.set_page(0, 10_000_000, 44100, 120.0);
        grid.queue_clip(3, slot(1)).unwrap();
        grid.on_bar_boundary();
        grid.queue_stop(3).unwrap();
        assert_eq!(grid.active_slot(3), Some(slot(1)));
        grid.on_bar_boundary();
        assert_eq!(grid.active_slot(3), None);
        assert!(grid.queue_stop(8).is_err());
    }

    #[test]
    fn test_pattern_cycles_modulo_length() {
        let mut grid = ClipGrid::new();
        grid.set_pattern(0, "1 ~ 3 ~").unwrap();

        let mut queued = Vec::new();
        for _ in 0..6 {
            grid.tick_patterns();
            queued.push(grid.pending(0));
            grid.resolve_pending();
        }

        assert_eq!(
            queued,
            vec![
                PendingClip::Launch(slot(0)),
                PendingClip::None,
                PendingClip::Launch(slot(2)),
                PendingClip::None,
                PendingClip::Launch(slot(0)),
                PendingClip::None,
            ]
        );
        assert_eq!(grid.lane(0).map(|l| l.pattern_step()), Some(2));
    }

    #[test]
    fn test_trigger_and_select_scene() {
        let mut grid = ClipGrid::new();
        grid.trigger_scene(slot(4));
        for lane in 0..NUM_LANES {
            assert_eq!(grid.pending(lane), PendingClip::Launch(slot(4)));
        }

        grid.resolve_pending();
        grid.select_scene(SceneBank::B, slot(6), false);
        assert_eq!(grid.scene_b(), slot(6));
        assert_eq!(grid.pending(0), PendingClip::None);

        grid.select_scene(SceneBank::A, slot(3), true);
        assert_eq!(grid.scene_a(), slot(3));
        assert_eq!(grid.pending(7), PendingClip::Launch(slot(3)));
    }

    #[test]
    fn test_page_layout() {
        let total = 900_000;
        let (sr, bpm) = (44100, 120.0);
        let mut grid = ClipGrid::new();
        grid.set_page_with(0, total, sr, bpm, 8, 8);

        let bar = (60.0 / bpm * 4.0 * sr as f64).round() as usize;
        let slot_len = bar * 8;
        let first = grid.clip(0, slot(0)).copied().unwrap();
        assert_eq!((first.start, first.end), (0, slot_len));
        assert_eq!(first.len(), 705_600);
        assert_eq!(first.name(), "Clip 1-1");

        let second = grid.clip(5, slot(1)).copied().unwrap();
        assert_eq!(second.start, slot_len);
        assert_eq!(second.end, total);

        // Slots past the end of the track are omitted
        for s in 2..NUM_SLOTS {
            assert!(grid.clip(0, slot(s)).is_none());
        }
    }

    #[test]
    fn test_page_offsets_and_reset() {
        let mut grid = ClipGrid::new();
        grid.set_pattern(2, "2 2").unwrap();
        grid.queue_clip(0, slot(0)).unwrap();
        grid.on_bar_boundary();

        let total = 100_000_000;
        grid.set_page(1, total, 44100, 120.0);
        let slot_len = bar_samples(120.0, 44100) * DEFAULT_BARS_PER_SLOT;
        assert_eq!(grid.clip(0, slot(0)).map(|c| c.start), Some(8 * slot_len));
        assert_eq!(grid.current_page(), 1);
        assert_eq!(grid.active_slot(0), None);
        assert_eq!(grid.pending(2), PendingClip::None);
        assert_eq!(grid.lane(2).map(|l| l.pattern().len()), Some(2));
    }

    #[test]
    fn test_page_sanitizes_bad_tempo() {
        let mut grid = ClipGrid::new();
        grid.set_page_with(0, 10_000_000, 0, 0.0, 0, 0);
        let expected = bar_samples(FALLBACK_BPM, FALLBACK_SAMPLE_RATE) * DEFAULT_BARS_PER_SLOT;
        assert_eq!(grid.clip(0, slot(0)).map(|c| c.len()), Some(expected));
    }

    #[test]
    fn test_huge_page_is_empty() {
        let mut grid = ClipGrid::new();
        grid.set_page(usize::MAX / 4, 1_000_000, 44100, 120.0);
        assert_eq!(grid.current_page(), usize::MAX / 4);
        for lane in 0..NUM_LANES {
            for s in 0..NUM_SLOTS {
                assert!(grid.clip(lane, slot(s)).is_none());
            }
        }

        grid.set_page_with(usize::MAX, usize::MAX, 44100, 1e-3, usize::MAX, usize::MAX);
        assert!(grid.clip(0, slot(0)).is_none());
    }

    #[test]
    fn test_active_clip_on_empty_cell() {
        let mut grid = ClipGrid::new();
        grid.set_page(0, 1000, 44100, 120.0);
        grid.queue_clip(0, slot(5)).unwrap();
        grid.on_bar_boundary();
        assert_eq!(grid.active_slot(0), Some(slot(5)));
        assert!(grid.active_clip(0).is_none());
    }
}
