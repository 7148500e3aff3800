//! The keyboard engine: single owner of keyboard state and the report sink.
//!
//! # Architecture
//!
//! Live key events and a running replay both want to mutate the same
//! [`KeyboardState`] and write through the same [`ReportSink`]. Rather than
//! wrapping both in a lock and leaving the ordering implicit in lock
//! acquisition, all mutations funnel through one engine task fed by a
//! bounded command queue:
//!
//! ```text
//! KeyboardHandle (live input) ──┐
//!                               ├──> mpsc queue ──> engine task
//! playback worker ──────────────┘                    ├─ mutate KeyboardState
//!                                                    ├─ encode + write sink
//!                                                    └─ recorder tap (armed)
//! ```
//!
//! Commands are applied strictly in arrival order, and "mutate + encode +
//! write" is one atomic step inside the loop, so exactly one effective
//! writer exists at any instant.
//!
//! # Playback arbitration
//!
//! Playback commands carry their session id. The engine tracks the single
//! active session and discards commands from any other (a cancelled worker
//! may still be draining), which is what keeps a replaced replay from
//! interleaving writes with its successor. Live input pre-empts a running
//! playback: the engine cancels the session, applies the fail-safe
//! release-all, and only then applies the live event, so an operator can
//! always regain control of the keyboard.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hidpilot_core::{KeyboardState, Modifiers, Recorder, RecorderError, Recording};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::infrastructure::sink::{ReportSink, SinkError};

/// Identifies one playback session for command tagging and log correlation.
pub type PlaybackId = Uuid;

/// Depth of the engine command queue.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The device write failed; the triggering operation did not take effect
    /// on the host.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// Recorder session management failed.
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    /// The engine task is no longer running.
    #[error("keyboard engine is no longer running")]
    Closed,
}

/// A single keyboard mutation.
#[derive(Debug, Clone)]
pub enum KeyAction {
    Press {
        modifiers: Modifiers,
        keycode: Option<u8>,
    },
    Release {
        modifiers: Modifiers,
        keycode: Option<u8>,
    },
    /// Clear every held modifier and keycode.
    ReleaseAll,
    /// Write the all-zero report and clear the state with it, so host and
    /// daemon can never disagree about what is held.
    Reset,
}

/// Commands processed by the engine task.
pub(crate) enum EngineCommand {
    /// A live operator event; the device-write result is reported back.
    Live {
        action: KeyAction,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// An event generated by the playback worker of `session`.
    Playback {
        session: PlaybackId,
        action: KeyAction,
    },
    /// Registers `session` as the active playback; `cancel` lets the engine
    /// stop the worker on live pre-emption or a failed step.
    PlaybackStarted {
        session: PlaybackId,
        cancel: Arc<watch::Sender<bool>>,
    },
    /// The worker of `session` is done (completed, cancelled, or aborted).
    PlaybackFinished { session: PlaybackId },
    StartRecording {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    StopRecording {
        reply: oneshot::Sender<Result<Recording, EngineError>>,
    },
}

/// Where a command originated; only live events feed the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Live,
    Playback,
    /// Engine-internal fail-safe writes.
    Internal,
}

/// Cloneable handle through which live input, recording control, and the
/// playback worker reach the engine task.
#[derive(Clone)]
pub struct KeyboardHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl KeyboardHandle {
    /// Registers a key press and commits the new report to the device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Sink`] if the device write failed and
    /// [`EngineError::Closed`] if the engine has stopped.
    pub async fn press(&self, modifiers: Modifiers, keycode: Option<u8>) -> Result<(), EngineError> {
        self.live(KeyAction::Press { modifiers, keycode }).await
    }

    /// Registers a key release and commits the new report to the device.
    pub async fn release(
        &self,
        modifiers: Modifiers,
        keycode: Option<u8>,
    ) -> Result<(), EngineError> {
        self.live(KeyAction::Release { modifiers, keycode }).await
    }

    /// Releases every held modifier and keycode.
    pub async fn release_all(&self) -> Result<(), EngineError> {
        self.live(KeyAction::ReleaseAll).await
    }

    /// Writes the all-zero report and clears the keyboard state with it.
    pub async fn reset(&self) -> Result<(), EngineError> {
        self.live(KeyAction::Reset).await
    }

    /// Arms the recorder with a fresh log.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::AlreadyRecording`] (wrapped) if a capture is
    /// already in progress; that capture keeps running.
    pub async fn start_recording(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(EngineCommand::StartRecording { reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    /// Disarms the recorder and returns the normalized capture.
    pub async fn stop_recording(&self) -> Result<Recording, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(EngineCommand::StopRecording { reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    async fn live(&self, action: KeyAction) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(EngineCommand::Live { action, reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub(crate) async fn send_command(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.tx.send(command).await.map_err(|_| EngineError::Closed)
    }
}

/// The currently registered playback session.
struct ActivePlayback {
    id: PlaybackId,
    cancel: Arc<watch::Sender<bool>>,
}

/// Owns the [`KeyboardState`] and the [`ReportSink`] for the process
/// lifetime and applies every mutation in arrival order.
pub struct KeyboardEngine {
    state: KeyboardState,
    sink: Arc<dyn ReportSink>,
    recorder: Recorder,
    active_playback: Option<ActivePlayback>,
    rx: mpsc::Receiver<EngineCommand>,
}

impl KeyboardEngine {
    /// Spawns the engine task and returns the handle to feed it.
    ///
    /// The task runs until every [`KeyboardHandle`] clone has been dropped.
    pub fn spawn(sink: Arc<dyn ReportSink>) -> (KeyboardHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let engine = Self {
            state: KeyboardState::new(),
            sink,
            recorder: Recorder::new(),
            active_playback: None,
            rx,
        };
        let task = tokio::spawn(engine.run());
        (KeyboardHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("keyboard engine started");
        while let Some(command) = self.rx.recv().await {
            self.handle_command(command);
        }
        info!("keyboard engine stopped");
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Live { action, reply } => {
                if self.active_playback.is_some() {
                    info!("live input pre-empts the running playback");
                    self.abort_active_playback();
                }
                let result = self.apply_action(&action, Source::Live).map_err(EngineError::from);
                let _ = reply.send(result);
            }

            EngineCommand::Playback { session, action } => {
                if self.active_playback.as_ref().map(|p| p.id) != Some(session) {
                    debug!(%session, "discarding command from a cancelled playback session");
                    return;
                }
                if let Err(e) = self.apply_action(&action, Source::Playback) {
                    error!(error = %e, %session, "playback step failed, aborting playback");
                    self.abort_active_playback();
                }
            }

            EngineCommand::PlaybackStarted { session, cancel } => {
                // The controller joins the previous worker before starting a
                // new one, so an overlap here means the old session must not
                // keep writing.
                if self.active_playback.is_some() {
                    warn!(%session, "playback registered while another is active");
                    self.abort_active_playback();
                }
                debug!(%session, "playback session registered");
                self.active_playback = Some(ActivePlayback { id: session, cancel });
            }

            EngineCommand::PlaybackFinished { session } => {
                if self.active_playback.as_ref().map(|p| p.id) == Some(session) {
                    debug!(%session, "playback session finished");
                    self.active_playback = None;
                }
            }

            EngineCommand::StartRecording { reply } => {
                let result = self.recorder.start().map_err(EngineError::from);
                if result.is_ok() {
                    info!("recording started");
                }
                let _ = reply.send(result);
            }

            EngineCommand::StopRecording { reply } => {
                let result = self.recorder.stop_and_normalize().map_err(EngineError::from);
                if let Ok(recording) = &result {
                    info!(events = recording.len(), "recording stopped");
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Applies one mutation as an atomic "mutate + encode + write" step.
    ///
    /// The recorder timestamp is captured at the mutation point so the log
    /// matches what was actually sent; the tap itself happens only after the
    /// device write succeeded, because an event that never reached the host
    /// must not be replayed later.
    fn apply_action(&mut self, action: &KeyAction, source: Source) -> Result<(), SinkError> {
        let stamp = (source == Source::Live && self.recorder.is_armed())
            .then(wall_clock_seconds);

        match action {
            KeyAction::Press { modifiers, keycode } => self.state.press(*modifiers, *keycode),
            KeyAction::Release { modifiers, keycode } => self.state.release(*modifiers, *keycode),
            KeyAction::ReleaseAll | KeyAction::Reset => self.state.release_all(),
        }

        let report = self.state.encode();
        self.sink.write_report(&report)?;

        if let Some(timestamp) = stamp {
            match action {
                KeyAction::Press { modifiers, keycode } => {
                    self.recorder.on_press(*modifiers, *keycode, timestamp)
                }
                KeyAction::Release { modifiers, keycode } => {
                    self.recorder.on_release(*modifiers, *keycode, timestamp)
                }
                KeyAction::ReleaseAll | KeyAction::Reset => {}
            }
        }
        Ok(())
    }

    /// Cancels the active playback session and applies the fail-safe
    /// release, so a half-applied replay can never leave a key stuck.
    fn abort_active_playback(&mut self) {
        let Some(playback) = self.active_playback.take() else {
            return;
        };
        let _ = playback.cancel.send(true);
        if let Err(e) = self.apply_action(&KeyAction::ReleaseAll, Source::Internal) {
            error!(error = %e, "fail-safe release after playback abort failed");
        }
    }
}

/// Wall-clock seconds since the Unix epoch, used to stamp recorded events.
fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
