//! MacroService: record, persist, and replay keystroke macros.
//!
//! This is the surface the remote transport drives. It ties the keyboard
//! engine (live input + recorder arming), the [`RecordingStore`]
//! (persistence), and the [`PlaybackController`] (replay supervision)
//! together, so a caller never has to coordinate them by hand.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::keyboard_engine::{EngineError, KeyboardHandle, PlaybackId};
use crate::application::playback::{PlaybackController, PlaybackError, PlaybackOutcome};
use crate::infrastructure::storage::recordings::{
    RecordingStore, StoreError, DEFAULT_RECORDING_NAME,
};

/// Error type for macro operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Facade over recording, persistence, and replay.
pub struct MacroService {
    keyboard: KeyboardHandle,
    playback: PlaybackController,
    store: RecordingStore,
}

impl MacroService {
    /// Creates the service on top of a running engine and a recording store.
    pub fn new(keyboard: KeyboardHandle, store: RecordingStore) -> Self {
        let playback = PlaybackController::new(keyboard.clone());
        Self {
            keyboard,
            playback,
            store,
        }
    }

    /// Returns the handle live input should be fed through.
    pub fn keyboard(&self) -> &KeyboardHandle {
        &self.keyboard
    }

    /// Arms the recorder.
    ///
    /// # Errors
    ///
    /// Fails if a capture is already in progress or the engine has stopped.
    pub async fn start_recording(&self) -> Result<(), ServiceError> {
        self.keyboard.start_recording().await?;
        Ok(())
    }

    /// Stops the capture, normalizes it, and persists it under `name`
    /// (or [`DEFAULT_RECORDING_NAME`]). Returns the path written.
    pub async fn stop_recording(&self, name: Option<&str>) -> Result<PathBuf, ServiceError> {
        let recording = self.keyboard.stop_recording().await?;
        let name = name.unwrap_or(DEFAULT_RECORDING_NAME);
        let path = self.store.save(&recording, name)?;
        info!(name, events = recording.len(), "macro saved");
        Ok(path)
    }

    /// Loads the recording saved under `name` (or the default) and starts
    /// replaying it, cancelling any replay already running.
    ///
    /// # Errors
    ///
    /// Surfaces [`StoreError::NotFound`] / [`StoreError::Parse`] without
    /// touching keyboard state, and [`PlaybackError`] for replay failures.
    pub async fn play(&mut self, name: Option<&str>) -> Result<PlaybackId, ServiceError> {
        let name = name.unwrap_or(DEFAULT_RECORDING_NAME);
        let recording = self.store.load(name)?;
        info!(name, "replaying macro");
        let id = self.playback.start(recording).await?;
        Ok(id)
    }

    /// Cancels the running replay, if any, and reports how it ended.
    pub async fn stop_playback(&mut self) -> Option<PlaybackOutcome> {
        self.playback.stop().await
    }

    /// Waits for the running replay to end on its own.
    pub async fn wait_for_playback(&mut self) -> Option<PlaybackOutcome> {
        self.playback.wait().await
    }

    /// Returns `true` while a replay is running.
    pub fn is_playing(&self) -> bool {
        self.playback.is_active()
    }

    /// Lists the names of all saved macros.
    pub fn saved_macros(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.store.list()?)
    }

    /// Stops any replay and releases every held key. Called on daemon
    /// shutdown so the host is not left with keys stuck down.
    pub async fn shutdown(&mut self) {
        self.playback.stop().await;
        if let Err(e) = self.keyboard.release_all().await {
            warn!("release-all on shutdown failed: {e}");
        }
    }
}
