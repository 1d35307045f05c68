//! Background loader: decodes tracks, loads cached stems and computes
//! waveforms off the audio and control threads

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use stemdeck_audio::{DeckId, LaneBuffers};

use crate::loader::{LoadError, TrackLoader, TrackMetadata};
use crate::stems::{derive_lanes, lane_buffers, load_cached_stems, stems_dir_for};
use crate::waveform::{compute_waveform, waveform_points, Waveform};

/// Ask the worker to load `path` onto `deck`
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub deck: DeckId,
    pub path: PathBuf,
}

enum WorkerMessage {
    Load(LoadRequest),
    Stop,
}

/// Progress reported by the worker, in order per request
#[derive(Debug)]
pub enum LoaderEvent {
    MixReady {
        deck: DeckId,
        path: PathBuf,
        mix: Arc<Vec<f32>>,
        metadata: TrackMetadata,
    },
    StemsReady {
        deck: DeckId,
        lanes: Box<LaneBuffers>,
    },
    WaveformReady {
        deck: DeckId,
        waveform: Arc<Waveform>,
    },
    Failed {
        deck: DeckId,
        error: String,
    },
}

/// Handle to the loader thread
pub struct LoadWorker {
    request_tx: Sender<WorkerMessage>,
    event_rx: Receiver<LoaderEvent>,
    handle: Option<JoinHandle<()>>,
}

impl LoadWorker {
    /// Start the worker; `stems_dir` is the root of cached stems, if any
    pub fn spawn(loader: TrackLoader, stems_dir: Option<PathBuf>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = bounded(16);
        let (event_tx, event_rx) = bounded(64);
        let handle = thread::Builder::new()
            .name("stemdeck-loader".into())
            .spawn(move || run(loader, stems_dir, request_rx, event_tx))?;
        Ok(Self {
            request_tx,
            event_rx,
            handle: Some(handle),
        })
    }

    /// Queue a load without blocking; false if the queue is full or the
    /// worker has exited
    pub fn request(&self, deck: DeckId, path: PathBuf) -> bool {
        self.request_tx
            .try_send(WorkerMessage::Load(LoadRequest { deck, path }))
            .is_ok()
    }

    pub fn events(&self) -> &Receiver<LoaderEvent> {
        &self.event_rx
    }

    /// Ask the worker to stop and wait up to `timeout` for it
    ///
    /// Returns false if the thread was still busy and has been abandoned.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        let _ = self.request_tx.try_send(WorkerMessage::Stop);
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("Loader: worker did not stop within {:?}, abandoning it", timeout);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().is_ok()
    }
}

fn run(loader: TrackLoader, stems_dir: Option<PathBuf>, requests: Receiver<WorkerMessage>, events: Sender<LoaderEvent>) {
    tracing::info!("Loader: worker started");
    loop {
        match requests.recv_timeout(Duration::from_millis(100)) {
            Ok(WorkerMessage::Load(request)) => {
                let deck = request.deck;
                if let Err(e) = load(&loader, stems_dir.as_deref(), request, &events) {
                    tracing::warn!("Loader: deck {} failed: {}", deck, e);
                    let _ = events.send(LoaderEvent::Failed {
                        deck,
                        error: e.to_string(),
                    });
                }
            }
            Ok(WorkerMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    tracing::info!("Loader: worker stopped");
}

fn load(
    loader: &TrackLoader,
    stems_dir: Option<&std::path::Path>,
    request: LoadRequest,
    events: &Sender<LoaderEvent>,
) -> Result<(), LoadError> {
    let LoadRequest { deck, path } = request;
    let started = Instant::now();
    let track = loader.load(&path)?;
    let frames = track.frames();
    tracing::info!(
        "Loader: decoded {} ({} frames) in {:?}",
        path.display(),
        frames,
        started.elapsed()
    );

    let mix = Arc::new(track.samples);
    let _ = events.send(LoaderEvent::MixReady {
        deck,
        path: path.clone(),
        mix: Arc::clone(&mix),
        metadata: track.metadata,
    });

    let waveform = compute_waveform(&mix, track.sample_rate, waveform_points(frames, track.sample_rate));
    let _ = events.send(LoaderEvent::WaveformReady {
        deck,
        waveform: Arc::new(waveform),
    });

    if let Some(root) = stems_dir {
        let stems = load_cached_stems(&stems_dir_for(root, &path), loader)?;
        let lanes = derive_lanes(&stems, frames, track.sample_rate);
        let _ = events.send(LoaderEvent::StemsReady {
            deck,
            lanes: lane_buffers(lanes),
        });
        tracing::info!("Loader: lanes ready for deck {}", deck);
    }
    Ok(())
}
