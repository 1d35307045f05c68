//! stemdeck - two-deck stem mixing engine
//!
//! Opens the default output device, runs the render callback and the
//! control loop, and reads line commands from stdin.

mod device;
mod input;
mod session;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{select, Receiver, Sender};
use tracing_subscriber::EnvFilter;

use stemdeck_audio::{
    render_link, AudioEngine, AudioEvent, ControlLoop, DeckId, EngineConfig, EngineState,
    EngineStatus, MixParameters, CHANNELS,
};
use stemdeck_library::{Config, LoadWorker, TrackLoader};

use device::{device_sample_rate, output_config};
use input::{parse_line, Input, HELP};
use session::Session;

/// Capacity of the control-to-render command queue
const RENDER_QUEUE: usize = 1024;

/// How long the loader gets to finish its current file on exit
const LOADER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest callback buffer converted without growing, in frames
const MAX_DEVICE_FRAMES: usize = 8192;

struct Args {
    config: Option<PathBuf>,
    tracks: Vec<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        tracks: Vec::new(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "-h" | "--help" => {
                println!("usage: stemdeck [--config <path>] [track-a] [track-b]\n\n{}", HELP);
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => bail!("unknown option {}", flag),
            _ => args.tracks.push(arg.into()),
        }
    }
    if args.tracks.len() > 2 {
        bail!("at most two tracks (deck A and deck B)");
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => Config::load_from(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::load(),
    };
    let mut engine_config = config.engine_config();
    // Render and decode at the device rate so playback is never pitch-shifted
    match device_sample_rate(engine_config.sample_rate) {
        Ok(rate) if rate != engine_config.sample_rate => {
            tracing::warn!(
                "Audio: device runs at {} Hz, rendering at that rate instead of {} Hz",
                rate,
                engine_config.sample_rate
            );
            engine_config.sample_rate = rate;
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Audio: {}", e),
    }

    // Create audio channels
    let (cmd_tx, cmd_rx, evt_tx, evt_rx) = AudioEngine::create_channels();
    let mix = Arc::new(MixParameters::new());
    let xruns = Arc::new(AtomicU64::new(0));
    let (control_link, render) = render_link(RENDER_QUEUE, xruns.clone());

    let mut state = EngineState::new(&engine_config, mix.clone());
    state.connect(render);

    // Shutdown flag for the audio thread
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_audio = shutdown.clone();
    let audio_events = evt_tx.clone();
    let sample_rate = engine_config.sample_rate;
    let audio_handle = thread::Builder::new()
        .name("stemdeck-audio".into())
        .spawn(move || run_audio_thread(state, sample_rate, xruns, audio_events, shutdown_audio))
        .context("spawning audio thread")?;

    let session = Session::new(evt_tx.clone());
    let control = ControlLoop::new(cmd_rx, evt_tx, mix, control_link, &engine_config);
    let control_handle = thread::Builder::new()
        .name("stemdeck-control".into())
        .spawn(move || control.run())
        .context("spawning control thread")?;

    let loader = LoadWorker::spawn(TrackLoader::with_sample_rate(sample_rate), config.stems_dir.clone())
        .context("spawning load worker")?;

    let engine = AudioEngine::new(cmd_tx, evt_rx);
    let result = run_app(&engine, &loader, session, config, args.tracks, &engine_config);

    // Cleanup
    engine.shutdown();
    let _ = control_handle.join();
    shutdown.store(true, Ordering::SeqCst);
    let _ = audio_handle.join();
    loader.shutdown(LOADER_JOIN_TIMEOUT);

    let config = result?;
    if let Err(e) = config.save() {
        tracing::warn!("Config: {}", e);
    }
    Ok(())
}

fn run_audio_thread(
    mut state: EngineState,
    sample_rate: u32,
    xruns: Arc<AtomicU64>,
    evt_tx: Sender<AudioEvent>,
    shutdown: Arc<AtomicBool>,
) {
    // Get audio host and device
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = evt_tx.send(AudioEvent::Error("No audio output device found".into()));
            return;
        }
    };

    let config = match output_config(&device, sample_rate) {
        Ok(c) => c,
        Err(e) => {
            let _ = evt_tx.send(AudioEvent::Error(format!("Failed to get audio config: {}", e)));
            return;
        }
    };
    if config.sample_rate().0 != sample_rate {
        tracing::warn!(
            "Audio: device runs at {} Hz, engine renders at {} Hz",
            config.sample_rate().0,
            sample_rate
        );
    }
    let channels = config.channels() as usize;
    tracing::info!("Audio: {} channels at {} Hz", channels, config.sample_rate().0);

    // Stereo scratch for devices that are not two-channel
    let mut stereo_buffer = vec![0.0f32; MAX_DEVICE_FRAMES * CHANNELS];

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if channels == CHANNELS {
                state.process(data);
                return;
            }
            let frames = data.len() / channels.max(1);
            if stereo_buffer.len() < frames * CHANNELS {
                stereo_buffer.resize(frames * CHANNELS, 0.0);
            }
            let stereo = &mut stereo_buffer[..frames * CHANNELS];
            state.process(stereo);
            for (frame, pair) in data.chunks_mut(channels).zip(stereo.chunks(CHANNELS)) {
                if channels == 1 {
                    frame[0] = (pair[0] + pair[1]) * 0.5;
                } else {
                    frame.fill(0.0);
                    frame[0] = pair[0];
                    frame[1] = pair[1];
                }
            }
        },
        move |_err| {
            xruns.fetch_add(1, Ordering::Relaxed);
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = evt_tx.send(AudioEvent::Error(format!("Failed to create audio stream: {}", e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = evt_tx.send(AudioEvent::Error(format!("Failed to start audio: {}", e)));
        return;
    }

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(20));
    }
    drop(stream);
    tracing::info!("Audio: stream closed");
}

/// Spawn a thread forwarding stdin lines; the channel closes at EOF
fn stdin_lines() -> io::Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::bounded(64);
    thread::Builder::new().name("stemdeck-stdin".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Input: {}", e);
                    break;
                }
            }
        }
    })?;
    Ok(rx)
}

fn run_app(
    engine: &AudioEngine,
    loader: &LoadWorker,
    mut session: Session,
    mut config: Config,
    tracks: Vec<PathBuf>,
    engine_config: &EngineConfig,
) -> anyhow::Result<Config> {
    // Positional tracks win over the previous session's decks
    let startup: Vec<(DeckId, PathBuf)> = if tracks.is_empty() {
        [(DeckId::A, config.last_track_a.clone()), (DeckId::B, config.last_track_b.clone())]
            .into_iter()
            .filter_map(|(deck, path)| path.filter(|p| p.exists()).map(|p| (deck, p)))
            .collect()
    } else {
        DeckId::ALL.into_iter().zip(tracks).collect()
    };
    for (deck, path) in startup {
        request_load(loader, deck, path);
    }

    tracing::info!(
        "stemdeck ready: block {} frames at {} Hz (type help for commands)",
        engine_config.block_size,
        engine_config.sample_rate
    );

    let lines = stdin_lines()?;
    let mut latest: Option<EngineStatus> = None;

    loop {
        select! {
            recv(lines) -> line => {
                let Ok(line) = line else {
                    tracing::info!("Input: end of stdin, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(Input::Quit) => break,
                    Ok(Input::Help) => println!("{}", HELP),
                    Ok(Input::Status) => match &latest {
                        Some(status) => print_status(status, &session),
                        None => println!("no status yet"),
                    },
                    Ok(Input::Load(deck, path)) => request_load(loader, deck, path),
                    Ok(Input::Engine(cmd)) => {
                        if let Err(e) = engine.send(cmd) {
                            tracing::warn!("Control: {}", e);
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            recv(loader.events()) -> event => {
                let Ok(event) = event else {
                    bail!("load worker stopped unexpectedly");
                };
                session.handle_loader_event(engine, &mut config, event);
            }
            recv(engine.event_rx) -> event => match event {
                Ok(AudioEvent::Status(status)) => latest = Some(*status),
                Ok(AudioEvent::TrackLoaded { deck }) => tracing::info!("Deck {}: ready to play", deck),
                Ok(AudioEvent::Error(e)) => {
                    tracing::warn!("Engine: {}", e);
                    println!("error: {}", e);
                }
                Err(_) => bail!("control loop stopped unexpectedly"),
            },
        }
    }

    Ok(config)
}

fn request_load(loader: &LoadWorker, deck: DeckId, path: PathBuf) {
    tracing::info!("Deck {}: loading {}", deck, path.display());
    if !loader.request(deck, path) {
        tracing::warn!("Loader: request queue full, try again");
    }
}

fn print_status(status: &EngineStatus, session: &Session) {
    for (deck, s) in DeckId::ALL.iter().zip(status.decks.iter()) {
        let clips: Vec<String> = s
            .active_clips
            .iter()
            .map(|c| c.map_or_else(|| "-".to_string(), |slot| (slot.index() + 1).to_string()))
            .collect();
        println!(
            "deck {} {} {}/{} bar {} beat {} bpm {:.2} speed {:.3}{} page {} clips [{}]{}{}",
            deck,
            if s.playing { "playing" } else { "stopped" },
            s.playhead,
            s.length,
            s.beat.bar,
            s.beat.beat,
            s.bpm,
            s.speed,
            if s.looping { " loop" } else { "" },
            s.current_page,
            clips.join(" "),
            if s.stems_ready { " stems" } else { "" },
            match session.waveform(*deck) {
                Some(w) if s.waveform_ready => format!(" waveform {}", w.len()),
                _ => String::new(),
            },
        );
    }
    println!(
        "xruns {} faults {} sanitized {} rejected {} synth {}",
        status.xrun_count,
        status.render_faults,
        status.sanitized_samples,
        status.rejected_commands,
        if status.synth_enabled { "on" } else { "off" }
    );
}
