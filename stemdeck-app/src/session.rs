//! App-side deck state fed by the load worker

use std::sync::Arc;

use crossbeam_channel::Sender;

use stemdeck_audio::{AudioCommand, AudioEngine, AudioEvent, DeckId};
use stemdeck_library::{Config, LoaderEvent, Waveform};

/// What the UI side knows about each deck beyond engine status
pub struct Session {
    /// Shared path into the engine's event channel for background failures
    events: Sender<AudioEvent>,
    waveforms: [Option<Arc<Waveform>>; 2],
}

impl Session {
    pub fn new(events: Sender<AudioEvent>) -> Self {
        Self {
            events,
            waveforms: [None, None],
        }
    }

    /// Overview envelope of the track on `deck`, once computed
    pub fn waveform(&self, deck: DeckId) -> Option<&Arc<Waveform>> {
        self.waveforms[deck.index()].as_ref()
    }

    /// Turn one loader event into engine commands and UI events
    pub fn handle_loader_event(&mut self, engine: &AudioEngine, config: &mut Config, event: LoaderEvent) {
        match event {
            LoaderEvent::MixReady {
                deck,
                path,
                mix,
                metadata,
            } => {
                tracing::info!(
                    "Deck {}: {} - {} ({:.1}s)",
                    deck,
                    metadata.artist,
                    metadata.title,
                    metadata.duration_secs
                );
                match deck {
                    DeckId::A => config.last_track_a = Some(path),
                    DeckId::B => config.last_track_b = Some(path),
                }
                self.waveforms[deck.index()] = None;
                self.send(engine, AudioCommand::LoadDeck { deck, mix });
            }
            LoaderEvent::StemsReady { deck, lanes } => {
                tracing::info!("Deck {}: stems ready", deck);
                self.send(engine, AudioCommand::LoadStems { deck, lanes });
            }
            LoaderEvent::WaveformReady { deck, waveform } => {
                tracing::debug!("Deck {}: waveform with {} points", deck, waveform.len());
                self.waveforms[deck.index()] = Some(waveform);
                // Follows this track's LoadDeck on the same channel
                self.send(engine, AudioCommand::WaveformReady(deck));
            }
            LoaderEvent::Failed { deck, error } => {
                tracing::warn!("Deck {}: {}", deck, error);
                let _ = self.events.try_send(AudioEvent::Error(format!("deck {}: {}", deck, error)));
            }
        }
    }

    fn send(&self, engine: &AudioEngine, cmd: AudioCommand) {
        if let Err(e) = engine.send(cmd) {
            tracing::warn!("Control: {}", e);
            let _ = self.events.try_send(AudioEvent::Error(e.to_string()));
        }
    }
}
