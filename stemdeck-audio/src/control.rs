//! Control loop: routes commands between the UI side and the render callback

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use ringbuf::traits::Producer;

use crate::commands::{AudioCommand, DeckId};
use crate::config::EngineConfig;
use crate::engine::{AudioEvent, ControlLink};
use crate::error::ControlError;
use crate::mixer::MixParameters;
use crate::status::EngineStatus;

/// Apply a mixer command straight to the shared parameters
pub fn apply_mixer_command(mix: &MixParameters, cmd: &AudioCommand) -> Result<(), ControlError> {
    match cmd {
        AudioCommand::SetLane { deck, lane, param } => mix.set_lane(*deck, *lane, *param),
        AudioCommand::SetMixer(param) => mix.set(*param),
        AudioCommand::StoreScene(idx) => mix.store_scene(*idx),
        _ => Ok(()),
    }
}

/// Runs on its own thread between the UI handle and the render callback
///
/// Mixer commands are applied to `MixParameters` here. Everything else is
/// validated and queued for the render callback, which applies it before
/// its next block.
pub struct ControlLoop {
    command_rx: Receiver<AudioCommand>,
    event_tx: Sender<AudioEvent>,
    mix: Arc<MixParameters>,
    link: ControlLink,
    status_interval: Duration,
    last_forward: Option<Instant>,
    latest: Option<EngineStatus>,
    loads_seen: [u64; 2],
}

impl ControlLoop {
    pub fn new(
        command_rx: Receiver<AudioCommand>,
        event_tx: Sender<AudioEvent>,
        mix: Arc<MixParameters>,
        link: ControlLink,
        config: &EngineConfig,
    ) -> Self {
        Self {
            command_rx,
            event_tx,
            mix,
            link,
            status_interval: Duration::from_millis(config.status_interval_ms.max(1)),
            last_forward: None,
            latest: None,
            loads_seen: [0; 2],
        }
    }

    /// Route one command
    pub fn dispatch(&mut self, cmd: AudioCommand) -> Result<(), ControlError> {
        if cmd.is_mixer() {
            return apply_mixer_command(&self.mix, &cmd);
        }
        cmd.validate()?;

        match &cmd {
            AudioCommand::LoadDeck { deck, mix } => {
                tracing::info!("Control: loading {} frames on deck {}", mix.len() / 2, deck);
            }
            AudioCommand::LoadStems { deck, .. } => {
                tracing::info!("Control: stems ready on deck {}", deck);
            }
            AudioCommand::SetPage { deck, page } => {
                tracing::debug!("Control: deck {} page {}", deck, page);
            }
            _ => {}
        }

        self.link.commands.try_push(cmd).map_err(|_| ControlError::QueueFull)?;
        Ok(())
    }

    /// Keep the newest status from the render side and forward it at most
    /// once per status interval
    ///
    /// `TrackLoaded` goes out as soon as a status shows a deck's load count
    /// moved, so a load the render side rejected is never announced.
    pub fn poll_status(&mut self) {
        while let Ok(status) = self.link.status.try_recv() {
            self.announce_loads(&status);
            self.latest = Some(status);
        }
        let due = self
            .last_forward
            .map_or(true, |t| t.elapsed() >= self.status_interval);
        if !due {
            return;
        }
        if let Some(status) = self.latest.take() {
            self.last_forward = Some(Instant::now());
            let _ = self.event_tx.try_send(AudioEvent::Status(Box::new(status)));
        }
    }

    fn announce_loads(&mut self, status: &EngineStatus) {
        for (deck, seen) in DeckId::ALL.into_iter().zip(self.loads_seen.iter_mut()) {
            let count = status.decks[deck.index()].load_count;
            if count > *seen {
                *seen = count;
                tracing::info!("Control: track loaded on deck {}", deck);
                let _ = self.event_tx.try_send(AudioEvent::TrackLoaded { deck });
            }
        }
    }

    fn report(&self, err: &ControlError) {
        tracing::warn!("Control: rejected command: {}", err);
        let _ = self.event_tx.try_send(AudioEvent::Error(err.to_string()));
    }

    /// Run until `Shutdown` arrives or every command sender is dropped
    pub fn run(mut self) {
        tracing::info!("Control loop started");
        loop {
            match self.command_rx.recv_timeout(self.status_interval) {
                Ok(AudioCommand::Shutdown) => {
                    let _ = self.link.commands.try_push(AudioCommand::Shutdown);
                    break;
                }
                Ok(cmd) => {
                    if let Err(e) = self.dispatch(cmd) {
                        self.report(&e);
                    }
                    // Drain a burst without waiting
                    while let Ok(cmd) = self.command_rx.try_recv() {
                        if matches!(cmd, AudioCommand::Shutdown) {
                            let _ = self.link.commands.try_push(AudioCommand::Shutdown);
                            tracing::info!("Control loop stopped");
                            return;
                        }
                        if let Err(e) = self.dispatch(cmd) {
                            self.report(&e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.poll_status();
        }
        tracing::info!("Control loop stopped");
    }
}
