//! Audio engine - orchestrates decks, mixer, synth and effects

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::clips::SlotIndex;
use crate::commands::{AudioCommand, DeckId};
use crate::config::EngineConfig;
use crate::control::apply_mixer_command;
use crate::deck::Deck;
use crate::effects::{master_compressor, sanitize, Compressor, Effect, SendEffects};
use crate::error::{ControlError, RenderFault};
use crate::mixer::{mix_decks, MixParameters};
use crate::status::EngineStatus;
use crate::stems::CHANNELS;
use crate::synth::SynthRack;
use crate::transport::Transport;

/// Events sent from the engine to the UI side
#[derive(Debug, Clone)]
pub enum AudioEvent {
    /// Latest engine status, forwarded at a bounded rate
    Status(Box<EngineStatus>),
    /// The render side installed a new whole-mix buffer on a deck
    TrackLoaded { deck: DeckId },
    /// Rejected command or background failure
    Error(String),
}

/// Control-side end of the link to the render callback
pub struct ControlLink {
    pub commands: HeapProd<AudioCommand>,
    pub status: Receiver<EngineStatus>,
}

/// Render-side end of the link to the control loop
pub struct RenderLink {
    pub commands: HeapCons<AudioCommand>,
    pub status: Sender<EngineStatus>,
    /// Incremented by the device error callback
    pub xruns: Arc<AtomicU64>,
}

/// Create the lock-free command queue and the status channel between
/// the control loop and the render callback
pub fn render_link(capacity: usize, xruns: Arc<AtomicU64>) -> (ControlLink, RenderLink) {
    let (prod, cons) = HeapRb::<AudioCommand>::new(capacity.max(1)).split();
    let (status_tx, status_rx) = bounded(16);
    (
        ControlLink {
            commands: prod,
            status: status_rx,
        },
        RenderLink {
            commands: cons,
            status: status_tx,
            xruns,
        },
    )
}

/// Audio engine state (held in audio thread)
pub struct EngineState {
    decks: [Deck; 2],
    mix: Arc<MixParameters>,
    sends: SendEffects,
    compressor: Option<Compressor>,
    synth: SynthRack,
    config: EngineConfig,
    link: Option<RenderLink>,
    // Pre-allocated processing buffers (avoids allocation in audio callback)
    buffer_a: Vec<f32>,
    buffer_b: Vec<f32>,
    frames_since_status: usize,
    render_faults: u64,
    rejected_commands: u64,
    sanitized: u64,
    shutdown: bool,
}

impl EngineState {
    pub fn new(config: &EngineConfig, mix: Arc<MixParameters>) -> Self {
        let sr = config.sample_rate;
        let samples = config.block_size * CHANNELS;
        Self {
            decks: [
                Deck::new(DeckId::A, sr, config.block_size),
                Deck::new(DeckId::B, sr, config.block_size),
            ],
            mix,
            sends: SendEffects::new(&config.effects, sr),
            compressor: master_compressor(&config.effects, sr),
            synth: SynthRack::new(sr, config.block_size),
            config: config.clone(),
            link: None,
            buffer_a: vec![0.0; samples],
            buffer_b: vec![0.0; samples],
            frames_since_status: 0,
            render_faults: 0,
            rejected_commands: 0,
            sanitized: 0,
            shutdown: false,
        }
    }

    /// Attach the command queue and status channel
    pub fn connect(&mut self, link: RenderLink) {
        self.link = Some(link);
    }

    pub fn deck(&self, id: DeckId) -> &Deck {
        &self.decks[id.index()]
    }

    pub fn synth(&self) -> &SynthRack {
        &self.synth
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown
    }

    /// Apply one command between blocks
    pub fn handle_command(&mut self, cmd: AudioCommand) -> Result<(), ControlError> {
        if cmd.is_mixer() {
            return apply_mixer_command(&self.mix, &cmd);
        }
        cmd.validate()?;

        match cmd {
            AudioCommand::Play(deck) => self.deck_mut(deck).transport_mut().start(),
            AudioCommand::Stop(deck) => self.deck_mut(deck).transport_mut().stop(),
            AudioCommand::Seek { deck, position } => self.deck_mut(deck).transport_mut().seek(position),
            AudioCommand::SetBpm(bpm) => {
                for deck in &mut self.decks {
                    deck.transport_mut().set_bpm(bpm);
                }
            }
            AudioCommand::Nudge { deck, samples } => self.deck_mut(deck).nudge(samples),
            AudioCommand::Bend { deck, speed } => self.deck_mut(deck).transport_mut().set_speed(speed),
            AudioCommand::Jump { deck, unit, amount } => self.deck_mut(deck).jump(unit, amount),
            AudioCommand::Beatmatch { source, target } => {
                if source != target {
                    let [a, b] = &mut self.decks;
                    let (src, dst) = match source {
                        DeckId::A => (&*a, b),
                        DeckId::B => (&*b, a),
                    };
                    beatmatch(src.transport(), dst.transport_mut());
                }
            }
            AudioCommand::SetLoop { deck, start, end } => self.deck_mut(deck).transport_mut().set_loop(start, end),
            AudioCommand::SetLooping { deck, looping } => {
                self.deck_mut(deck).transport_mut().set_looping(looping)
            }

            AudioCommand::QueueClip { deck, lane, slot } => {
                let clips = self.deck_mut(deck).clips_mut();
                match slot {
                    Some(slot) => clips.queue_clip(lane, SlotIndex::new(slot)?)?,
                    None => clips.queue_stop(lane)?,
                }
            }
            AudioCommand::TriggerScene { deck, scene } => {
                self.deck_mut(deck).clips_mut().trigger_scene(SlotIndex::new(scene)?)
            }
            AudioCommand::SelectScene {
                deck,
                bank,
                scene,
                launch,
            } => self
                .deck_mut(deck)
                .clips_mut()
                .select_scene(bank, SlotIndex::new(scene)?, launch),
            AudioCommand::SetPattern { deck, lane, pattern } => {
                self.deck_mut(deck).clips_mut().set_pattern(lane, &pattern)?
            }
            AudioCommand::ClearPatterns(deck) => self.deck_mut(deck).clips_mut().clear_patterns(),
            AudioCommand::SetPage { deck, page } => self.deck_mut(deck).set_page(page)?,

            AudioCommand::LoadDeck { deck, mix } => self.deck_mut(deck).load_mix(mix)?,
            AudioCommand::LoadStems { deck, lanes } => self.deck_mut(deck).load_lanes(*lanes)?,
            AudioCommand::WaveformReady(deck) => self.deck_mut(deck).mark_waveform_ready()?,

            AudioCommand::Synth(cmd) => self.synth.apply(cmd)?,

            AudioCommand::Shutdown => {
                for deck in &mut self.decks {
                    deck.transport_mut().stop();
                }
                self.sends.reset();
                if let Some(compressor) = self.compressor.as_mut() {
                    compressor.reset();
                }
                self.shutdown = true;
            }

            AudioCommand::SetLane { .. } | AudioCommand::SetMixer(_) | AudioCommand::StoreScene(_) => {}
        }
        Ok(())
    }

    fn deck_mut(&mut self, id: DeckId) -> &mut Deck {
        &mut self.decks[id.index()]
    }

    fn drain_commands(&mut self) {
        for _ in 0..self.config.command_batch {
            let Some(cmd) = self.link.as_mut().and_then(|link| link.commands.try_pop()) else {
                break;
            };
            if self.handle_command(cmd).is_err() {
                self.rejected_commands += 1;
            }
        }
    }

    /// Process one audio block
    ///
    /// Drains pending commands and renders, both under a panic guard, then
    /// publishes status. Any fault turns the block into silence.
    pub fn process(&mut self, output: &mut [f32]) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.drain_commands();
            self.render(output)
        }))
        .unwrap_or(Err(RenderFault::Panicked));
        if result.is_err() {
            output.fill(0.0);
            self.render_faults += 1;
        }

        self.frames_since_status += output.len() / CHANNELS;
        if self.frames_since_status >= self.config.status_interval_frames() {
            self.frames_since_status = 0;
            if let Some(link) = &self.link {
                let _ = link.status.try_send(self.status());
            }
        }
    }

    fn ensure_capacity(&mut self, samples: usize) {
        // This should rarely happen after the first call
        if samples > self.buffer_a.len() {
            self.buffer_a.resize(samples, 0.0);
            self.buffer_b.resize(samples, 0.0);
        }
    }

    fn render(&mut self, output: &mut [f32]) -> Result<(), RenderFault> {
        let len = output.len();
        if len % CHANNELS != 0 {
            return Err(RenderFault::OddOutput(len));
        }
        output.fill(0.0);
        if !self.decks.iter().any(Deck::is_playing) {
            return Ok(());
        }
        let frames = len / CHANNELS;

        self.ensure_capacity(len);
        let mix = self.mix.snapshot();
        let buf_a = &mut self.buffer_a[..len];
        let buf_b = &mut self.buffer_b[..len];
        let [deck_a, deck_b] = &mut self.decks;

        let stop_a = deck_a.render(mix.lanes(DeckId::A), mix.clip_only[0], mix.stem_blend, &mut self.sends, buf_a);
        let stop_b = deck_b.render(mix.lanes(DeckId::B), mix.clip_only[1], mix.stem_blend, &mut self.sends, buf_b);

        mix_decks(buf_a, buf_b, mix.crossfade, mix.master_gain, output);

        let clock = if deck_a.is_playing() { &*deck_a } else { &*deck_b };
        let transport = clock.transport();
        self.synth.render_into(transport.playhead(), transport.bpm(), output);

        self.sanitized += sanitize(output) as u64;
        if let Some(compressor) = self.compressor.as_mut() {
            compressor.process(output);
            self.sanitized += sanitize(output) as u64;
        }
        for s in output.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        deck_a.finish_block(frames, stop_a);
        deck_b.finish_block(frames, stop_b);
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            decks: [self.decks[0].status(), self.decks[1].status()],
            xrun_count: self.link.as_ref().map_or(0, |l| l.xruns.load(Ordering::Relaxed)),
            render_faults: self.render_faults,
            sanitized_samples: self.sanitized + self.decks.iter().map(Deck::sanitized_samples).sum::<u64>(),
            rejected_commands: self.rejected_commands,
            synth_enabled: self.synth.is_enabled(),
        }
    }
}

/// Copy the source tempo to the target and place the target so its next
/// downbeat lines up with the source's position within its bar
pub fn beatmatch(source: &Transport, target: &mut Transport) {
    target.set_bpm(source.bpm());

    let per_bar = source.beats_per_bar() as f64;
    let src_beats = source.total_beats();
    let dst_beats = target.total_beats();

    let src_bar_start = (src_beats / per_bar).floor() * per_bar;
    let dst_bar_start = ((dst_beats / per_bar).floor() + 1.0) * per_bar;
    let within_bar = src_beats - src_bar_start;

    let position = (dst_bar_start + within_bar) * target.samples_per_beat();
    target.seek(position.round() as i64);
}

/// Handle to communicate with the audio engine
pub struct AudioEngine {
    /// Send commands to the control loop
    pub command_tx: Sender<AudioCommand>,
    /// Receive events from the control loop
    pub event_rx: Receiver<AudioEvent>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
}

impl AudioEngine {
    /// Create channels for engine communication
    /// Buffer size of 1024 provides headroom for command bursts without saturation
    pub fn create_channels() -> (Sender<AudioCommand>, Receiver<AudioCommand>, Sender<AudioEvent>, Receiver<AudioEvent>) {
        let (cmd_tx, cmd_rx) = bounded(1024);
        let (evt_tx, evt_rx) = bounded(1024);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    /// Create a new engine handle
    pub fn new(command_tx: Sender<AudioCommand>, event_rx: Receiver<AudioEvent>) -> Self {
        Self {
            command_tx,
            event_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send a command without blocking
    pub fn send(&self, cmd: AudioCommand) -> Result<(), ControlError> {
        self.command_tx.try_send(cmd).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => ControlError::QueueFull,
            crossbeam_channel::TrySendError::Disconnected(_) => ControlError::Disconnected,
        })
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.try_send(AudioCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{LaneParam, MixerParam, SynthCommand};
    use crate::config::EffectsConfig;
    use crate::stems::NUM_LANES;
    use ringbuf::traits::Producer;

    const BLOCK: usize = 256;

    fn dry_config() -> EngineConfig {
        EngineConfig {
            block_size: BLOCK,
            effects: EffectsConfig {
                enabled: false,
                ..EffectsConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn engine() -> (EngineState, Arc<MixParameters>) {
        let mix = Arc::new(MixParameters::new());
        (EngineState::new(&dry_config(), Arc::clone(&mix)), mix)
    }

    fn constant(frames: usize, value: f32) -> Arc<Vec<f32>> {
        Arc::new(vec![value; frames * CHANNELS])
    }

    fn run(engine: &mut EngineState, cmd: AudioCommand) {
        engine.handle_command(cmd).unwrap();
    }

    #[test]
    fn test_silence_when_nothing_plays() {
        let (mut engine, _) = engine();
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(10_000, 0.5) });
        let mut out = vec![1.0; BLOCK * 2];
        engine.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_crossfade_endpoints() {
        let (mut engine, mix) = engine();
        mix.set(MixerParam::StemBlend(0.0)).unwrap();
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(100_000, 0.3) });
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::B, mix: constant(100_000, 0.6) });
        run(&mut engine, AudioCommand::Play(DeckId::A));
        run(&mut engine, AudioCommand::Play(DeckId::B));

        let mut out = vec![0.0; BLOCK * 2];
        mix.set(MixerParam::Crossfade(0.0)).unwrap();
        engine.process(&mut out);
        assert!(out.iter().all(|&s| (s - 0.3).abs() < 1e-6));

        mix.set(MixerParam::Crossfade(1.0)).unwrap();
        engine.process(&mut out);
        assert!(out.iter().all(|&s| (s - 0.6).abs() < 1e-6));

        mix.set(MixerParam::Crossfade(0.5)).unwrap();
        engine.process(&mut out);
        let g = std::f32::consts::FRAC_1_SQRT_2;
        assert!(out.iter().all(|&s| (s - (0.3 * g + 0.6 * g)).abs() < 1e-5));
    }

    #[test]
    fn test_output_is_hard_clipped() {
        let (mut engine, mix) = engine();
        mix.set(MixerParam::StemBlend(0.0)).unwrap();
        mix.set(MixerParam::MasterGain(2.0)).unwrap();
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(100_000, 0.9) });
        run(&mut engine, AudioCommand::Play(DeckId::A));

        let mut out = vec![0.0; BLOCK * 2];
        engine.process(&mut out);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_non_finite_lanes_are_sanitized() {
        let mix = Arc::new(MixParameters::new());
        let config = EngineConfig {
            block_size: BLOCK,
            ..EngineConfig::default()
        };
        let mut engine = EngineState::new(&config, Arc::clone(&mix));
        mix.set_lane(DeckId::A, 0, LaneParam::SendReverb(1.0)).unwrap();
        mix.set_lane(DeckId::A, 1, LaneParam::SendDelay(1.0)).unwrap();
        mix.set_lane(DeckId::A, 2, LaneParam::HighPass(500.0)).unwrap();

        let frames = 50_000;
        let mut bad = vec![0.2f32; frames * CHANNELS];
        for (i, s) in bad.iter_mut().enumerate() {
            match i % 7 {
                0 => *s = f32::NAN,
                3 => *s = f32::INFINITY,
                5 => *s = f32::NEG_INFINITY,
                _ => {}
            }
        }
        let bad = Arc::new(bad);
        let lanes: [Option<Arc<Vec<f32>>>; NUM_LANES] = std::array::from_fn(|_| Some(Arc::clone(&bad)));

        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: Arc::clone(&bad) });
        run(&mut engine, AudioCommand::LoadStems { deck: DeckId::A, lanes: Box::new(lanes) });
        mix.set(MixerParam::StemBlend(0.5)).unwrap();
        run(&mut engine, AudioCommand::Play(DeckId::A));

        let mut out = vec![0.0; BLOCK * 2];
        for _ in 0..20 {
            engine.process(&mut out);
            assert!(out.iter().all(|s| s.is_finite() && (-1.0..=1.0).contains(s)));
        }
        let status = engine.status();
        assert!(status.sanitized_samples > 0);
        assert_eq!(status.render_faults, 0);
    }

    #[test]
    fn test_deck_stops_at_exact_track_end() {
        let (mut engine, mix) = engine();
        mix.set(MixerParam::StemBlend(0.0)).unwrap();
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(1000, 0.5) });
        run(&mut engine, AudioCommand::Play(DeckId::A));

        let mut out = vec![0.0; BLOCK * 2];
        for block in 1..=4 {
            engine.process(&mut out);
            assert_eq!(engine.deck(DeckId::A).is_playing(), block < 4);
        }
        assert_eq!(engine.deck(DeckId::A).transport().playhead(), 1000);
        assert_eq!(out[2 * 231], 0.5);
        assert_eq!(out[2 * 232], 0.0);

        engine.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_bar_boundary_activates_queued_clip_once() {
        let (mut engine, _) = engine();
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(800_000, 0.0) });
        run(&mut engine, AudioCommand::Seek { deck: DeckId::A, position: 88_199 });
        run(&mut engine, AudioCommand::QueueClip { deck: DeckId::A, lane: 0, slot: Some(0) });
        run(&mut engine, AudioCommand::SetPattern { deck: DeckId::A, lane: 1, pattern: "2 ~".into() });
        run(&mut engine, AudioCommand::Play(DeckId::A));

        // One 2-frame block crosses 88200
        let mut out = vec![0.0; 4];
        engine.process(&mut out);
        let deck = engine.deck(DeckId::A);
        assert_eq!(deck.transport().playhead(), 88_201);
        assert_eq!(deck.clips().active_slot(0), SlotIndex::new(0).ok());
        assert_eq!(deck.clips().active_slot(1), SlotIndex::new(1).ok());
        assert_eq!(deck.clips().lane(1).map(|l| l.pattern_step()), Some(1));

        // No further boundary inside the bar
        engine.process(&mut out);
        assert_eq!(engine.deck(DeckId::A).clips().lane(1).map(|l| l.pattern_step()), Some(1));
    }

    #[test]
    fn test_beatmatch_aligns_next_downbeat() {
        let (mut engine, _) = engine();
        run(&mut engine, AudioCommand::SetBpm(128.0));
        let spb = engine.deck(DeckId::A).transport().samples_per_beat();
        let src_pos = (19.0 * spb).round() as i64;
        run(&mut engine, AudioCommand::Seek { deck: DeckId::A, position: src_pos });

        // Target runs at its own tempo, somewhere in its second bar
        run(&mut engine, AudioCommand::Seek { deck: DeckId::B, position: 100_000 });
        engine.deck_mut(DeckId::B).transport_mut().set_bpm(100.0);

        run(&mut engine, AudioCommand::Beatmatch { source: DeckId::A, target: DeckId::B });
        let dst = engine.deck(DeckId::B).transport();
        assert_eq!(dst.bpm(), 128.0);
        let beats = dst.total_beats();
        assert!((beats % 4.0 - 3.0).abs() < 1e-3);
        assert!(beats > 100_000.0 / spb);
        assert_eq!(dst.beat_info().bar, 3);
    }

    #[test]
    fn test_transport_commands() {
        let (mut engine, _) = engine();
        run(&mut engine, AudioCommand::SetBpm(120.0));
        run(&mut engine, AudioCommand::Jump { deck: DeckId::A, unit: crate::commands::JumpUnit::Bars, amount: 1.0 });
        assert_eq!(engine.deck(DeckId::A).transport().playhead(), 88_200);
        run(&mut engine, AudioCommand::Nudge { deck: DeckId::A, samples: -200 });
        assert_eq!(engine.deck(DeckId::A).transport().playhead(), 88_000);
        run(&mut engine, AudioCommand::Bend { deck: DeckId::A, speed: 9.0 });
        assert_eq!(engine.deck(DeckId::A).transport().speed(), 4.0);
        run(&mut engine, AudioCommand::SetLoop { deck: DeckId::A, start: 0, end: 1000 });
        run(&mut engine, AudioCommand::SetLooping { deck: DeckId::A, looping: true });
        assert!(engine.deck(DeckId::A).transport().is_looping());
    }

    #[test]
    fn test_rejected_commands() {
        let (mut engine, _) = engine();
        assert_eq!(
            engine.handle_command(AudioCommand::SetPage { deck: DeckId::B, page: 1 }),
            Err(ControlError::NoTrack(DeckId::B))
        );
        assert_eq!(
            engine.handle_command(AudioCommand::TriggerScene { deck: DeckId::A, scene: 8 }),
            Err(ControlError::SceneOutOfRange(8))
        );
        let lanes: [Option<Arc<Vec<f32>>>; NUM_LANES] = Default::default();
        assert!(engine
            .handle_command(AudioCommand::LoadStems { deck: DeckId::A, lanes: Box::new(lanes) })
            .is_err());
    }

    #[test]
    fn test_queue_drain_and_status() {
        let (mut engine, _) = engine();
        let (mut control, render) = render_link(64, Arc::new(AtomicU64::new(3)));
        engine.connect(render);

        assert!(control.commands.try_push(AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(100_000, 0.1) }).is_ok());
        assert!(control.commands.try_push(AudioCommand::Play(DeckId::A)).is_ok());
        assert!(control.commands.try_push(AudioCommand::SetPage { deck: DeckId::B, page: 2 }).is_ok());

        let mut out = vec![0.0; BLOCK * 2];
        let blocks = engine.config.status_interval_frames() / BLOCK + 1;
        for _ in 0..blocks {
            engine.process(&mut out);
        }
        let status = control.status.try_recv().unwrap();
        assert!(status.decks[0].playing);
        assert!(status.decks[0].loaded);
        assert!(!status.decks[1].loaded);
        assert_eq!(status.rejected_commands, 1);
        assert_eq!(status.xrun_count, 3);
    }

    #[test]
    fn test_huge_page_through_queue() {
        let (mut engine, _) = engine();
        let (mut control, render) = render_link(8, Arc::new(AtomicU64::new(0)));
        engine.connect(render);
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(100_000, 0.1) });

        for page in [usize::MAX / 4, usize::MAX] {
            assert!(control.commands.try_push(AudioCommand::SetPage { deck: DeckId::A, page }).is_ok());
            let mut out = vec![0.0; BLOCK * 2];
            engine.process(&mut out);

            let status = engine.status();
            assert_eq!(status.render_faults, 0);
            assert_eq!(status.rejected_commands, 0);
            assert_eq!(status.decks[0].current_page, page);
            assert!(engine.deck(DeckId::A).clips().clip(0, SlotIndex::new(0).unwrap()).is_none());
        }
    }

    #[test]
    fn test_waveform_flag_follows_loads() {
        let (mut engine, _) = engine();
        assert_eq!(
            engine.handle_command(AudioCommand::WaveformReady(DeckId::A)),
            Err(ControlError::NoTrack(DeckId::A))
        );
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(1000, 0.0) });
        assert!(!engine.status().decks[0].waveform_ready);
        run(&mut engine, AudioCommand::WaveformReady(DeckId::A));
        let status = engine.status();
        assert!(status.decks[0].waveform_ready);
        assert!(!status.decks[1].waveform_ready);
        assert_eq!(status.decks[0].load_count, 1);
    }

    /// Render a deck whose lane 0 carries a steady signal, with `send` on
    /// both of that lane's effect sends
    fn render_with_send(effects: EffectsConfig, send: f32, blocks: usize) -> Vec<f32> {
        let mix = Arc::new(MixParameters::new());
        let config = EngineConfig {
            block_size: BLOCK,
            effects,
            ..EngineConfig::default()
        };
        let mut engine = EngineState::new(&config, Arc::clone(&mix));
        mix.set(MixerParam::StemBlend(1.0)).unwrap();
        mix.set_lane(DeckId::A, 0, LaneParam::SendReverb(send)).unwrap();
        mix.set_lane(DeckId::A, 0, LaneParam::SendDelay(send)).unwrap();

        let frames = 50_000;
        let mut lanes: [Option<Arc<Vec<f32>>>; NUM_LANES] = Default::default();
        let tone: Vec<f32> = (0..frames * CHANNELS)
            .map(|i| 0.3 * ((i / CHANNELS) as f32 * 0.05).sin())
            .collect();
        lanes[0] = Some(Arc::new(tone));
        run(&mut engine, AudioCommand::LoadDeck { deck: DeckId::A, mix: constant(frames, 0.0) });
        run(&mut engine, AudioCommand::LoadStems { deck: DeckId::A, lanes: Box::new(lanes) });
        run(&mut engine, AudioCommand::Play(DeckId::A));

        let mut rendered = Vec::with_capacity(blocks * BLOCK * 2);
        let mut out = vec![0.0; BLOCK * 2];
        for _ in 0..blocks {
            engine.process(&mut out);
            rendered.extend_from_slice(&out);
        }
        rendered
    }

    #[test]
    fn test_sends_audible_with_effects() {
        let dry = render_with_send(EffectsConfig::default(), 0.0, 80);
        let wet = render_with_send(EffectsConfig::default(), 0.8, 80);
        assert!(dry.iter().any(|&s| s != 0.0));
        let diff = dry.iter().zip(&wet).map(|(d, w)| (d - w).abs()).fold(0.0f32, f32::max);
        assert!(diff > 1e-3);
    }

    #[test]
    fn test_sends_inert_without_effects() {
        let off = dry_config().effects;
        let dry = render_with_send(off, 0.0, 80);
        let wet = render_with_send(off, 0.8, 80);
        assert!(dry.iter().any(|&s| s != 0.0));
        assert_eq!(dry, wet);
    }

    #[test]
    fn test_odd_output_is_a_fault() {
        let (mut engine, _) = engine();
        run(&mut engine, AudioCommand::Play(DeckId::A));
        let mut out = vec![0.7; 5];
        engine.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.status().render_faults, 1);
    }

    #[test]
    fn test_synth_follows_playing_deck() {
        let (mut engine, _) = engine();
        run(&mut engine, AudioCommand::Synth(SynthCommand::Enable(true)));
        run(
            &mut engine,
            AudioCommand::Synth(SynthCommand::Pattern { lane: 0, pattern: "C4 C4 C4 C4".into() }),
        );
        // Synth is silent while no deck plays
        let mut out = vec![0.0; BLOCK * 2];
        engine.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        run(&mut engine, AudioCommand::Play(DeckId::B));
        let mut heard = false;
        for _ in 0..60 {
            engine.process(&mut out);
            heard |= out.iter().any(|&s| s.abs() > 1e-3);
        }
        assert!(heard);
        assert!(engine.status().synth_enabled);
    }

    #[test]
    fn test_shutdown_stops_decks() {
        let (mut engine, _) = engine();
        run(&mut engine, AudioCommand::Play(DeckId::A));
        run(&mut engine, AudioCommand::Shutdown);
        assert!(engine.is_shut_down());
        assert!(!engine.deck(DeckId::A).is_playing());
    }
}
