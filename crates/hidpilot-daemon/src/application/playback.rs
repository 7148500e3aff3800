//! Timed replay of recordings: the playback worker and its supervisor.
//!
//! A replay must never stall the live-event path, so it runs on its own
//! tokio task. The worker does not write reports itself: it paces the
//! recording against the clock and feeds press/release commands into the
//! same engine queue live input uses, so there is no playback-only encoding
//! path and no second writer on the device.
//!
//! # Cancellation
//!
//! The worker waits with `tokio::select!` over a `watch` cancellation signal
//! and the next event's deadline, so a stop request takes effect immediately
//! instead of after the longest inter-event gap. The signal is shared with
//! the engine, which cancels the session itself on live pre-emption or a
//! failed replay step. Whoever cancels, the fail-safe release runs before
//! the worker exits; the worker's own release command is session-tagged, so
//! the engine drops it when it has already released on the worker's behalf.

use std::sync::Arc;
use std::time::Duration;

use hidpilot_core::{EventKind, KeyEvent, Recording};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::keyboard_engine::{EngineCommand, KeyAction, KeyboardHandle, PlaybackId};

/// Error type for replay operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// The recording contains no events.
    #[error("recording is empty")]
    EmptyRecording,
    /// An event failed validation mid-replay; the whole replay is aborted
    /// rather than skipped past, since partial macro execution risks stuck
    /// keys.
    #[error("malformed event at index {index}")]
    MalformedEvent { index: usize },
    /// The keyboard engine is no longer running.
    #[error("keyboard engine is no longer running")]
    EngineClosed,
}

/// How a replay ended.
#[derive(Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every event was applied; the final keyboard state is left as-is.
    Completed,
    /// The replay was cancelled (stop request, restart, live pre-emption, or
    /// a failed step); the fail-safe release ran.
    Cancelled,
    /// The replay aborted on its own (malformed event or lost engine).
    Aborted(PlaybackError),
}

/// A running replay: its id, cancellation signal, and worker task.
struct PlaybackSession {
    id: PlaybackId,
    cancel: Arc<watch::Sender<bool>>,
    task: JoinHandle<PlaybackOutcome>,
}

/// Supervises at most one playback worker per engine.
///
/// Starting a new replay cancels the running one and joins its worker
/// before spawning the successor, so no background task ever outlives its
/// session and two replays can never race on the sink.
pub struct PlaybackController {
    keyboard: KeyboardHandle,
    current: Option<PlaybackSession>,
}

impl PlaybackController {
    /// Creates a controller that replays through `keyboard`.
    pub fn new(keyboard: KeyboardHandle) -> Self {
        Self {
            keyboard,
            current: None,
        }
    }

    /// Starts replaying `recording`, cancelling any running replay first.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::EmptyRecording`] for an empty recording and
    /// [`PlaybackError::EngineClosed`] if the engine has stopped.
    pub async fn start(&mut self, recording: Recording) -> Result<PlaybackId, PlaybackError> {
        if recording.is_empty() {
            return Err(PlaybackError::EmptyRecording);
        }

        self.stop().await;

        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel_tx);

        self.keyboard
            .send_command(EngineCommand::PlaybackStarted {
                session: id,
                cancel: Arc::clone(&cancel),
            })
            .await
            .map_err(|_| PlaybackError::EngineClosed)?;

        info!(
            %id,
            events = recording.len(),
            duration_s = recording.duration(),
            "playback started"
        );
        let task = tokio::spawn(run_player(id, recording, self.keyboard.clone(), cancel_rx));
        self.current = Some(PlaybackSession { id, cancel, task });
        Ok(id)
    }

    /// Cancels the running replay, waits for its worker to exit, and returns
    /// how it ended. `None` when no replay is running.
    pub async fn stop(&mut self) -> Option<PlaybackOutcome> {
        let session = self.current.take()?;
        let _ = session.cancel.send(true);
        match session.task.await {
            Ok(outcome) => {
                info!(id = %session.id, ?outcome, "playback stopped");
                Some(outcome)
            }
            Err(e) => {
                error!(id = %session.id, "playback worker panicked: {e}");
                None
            }
        }
    }

    /// Waits for the running replay to end on its own.
    pub async fn wait(&mut self) -> Option<PlaybackOutcome> {
        let session = self.current.take()?;
        match session.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(id = %session.id, "playback worker panicked: {e}");
                None
            }
        }
    }

    /// Returns `true` while a replay worker is still running.
    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(|s| !s.task.is_finished())
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Replays `recording` against the clock, feeding events into the engine.
async fn run_player(
    session: PlaybackId,
    recording: Recording,
    keyboard: KeyboardHandle,
    mut cancel_rx: watch::Receiver<bool>,
) -> PlaybackOutcome {
    let started = Instant::now();
    let mut last_timestamp = 0.0_f64;

    for (index, event) in recording.events().iter().enumerate() {
        if !is_well_formed(event, last_timestamp) {
            warn!(%session, index, "malformed event, aborting playback");
            let aborted = PlaybackOutcome::Aborted(PlaybackError::MalformedEvent { index });
            return finish(&keyboard, session, aborted, true).await;
        }
        last_timestamp = event.timestamp;

        let deadline = started + Duration::from_secs_f64(event.timestamp);
        if sleep_until_or_cancelled(deadline, &mut cancel_rx).await {
            debug!(%session, index, "cancellation observed during replay");
            return finish(&keyboard, session, PlaybackOutcome::Cancelled, true).await;
        }

        let action = match event.kind {
            EventKind::Press => KeyAction::Press {
                modifiers: event.modifiers,
                keycode: event.keycode,
            },
            EventKind::Release => KeyAction::Release {
                modifiers: event.modifiers,
                keycode: event.keycode,
            },
        };
        if keyboard
            .send_command(EngineCommand::Playback { session, action })
            .await
            .is_err()
        {
            return PlaybackOutcome::Aborted(PlaybackError::EngineClosed);
        }
    }

    finish(&keyboard, session, PlaybackOutcome::Completed, false).await
}

/// Deregisters the session, optionally issuing the fail-safe release first.
///
/// Both commands are session-tagged: if the engine already cancelled this
/// session (live pre-emption, failed step), it drops them and the release
/// it performed itself stands.
async fn finish(
    keyboard: &KeyboardHandle,
    session: PlaybackId,
    outcome: PlaybackOutcome,
    release_all: bool,
) -> PlaybackOutcome {
    if release_all {
        let _ = keyboard
            .send_command(EngineCommand::Playback {
                session,
                action: KeyAction::ReleaseAll,
            })
            .await;
    }
    let _ = keyboard
        .send_command(EngineCommand::PlaybackFinished { session })
        .await;
    outcome
}

/// Validates one event against the invariants normalization guarantees.
///
/// A timestamp that moves backwards, a non-finite timestamp, the keycode 0
/// sentinel, or an event that names neither a modifier nor a keycode cannot
/// come out of a healthy capture; encountering one means the file is corrupt
/// and the replay must not continue.
fn is_well_formed(event: &KeyEvent, last_timestamp: f64) -> bool {
    event.timestamp.is_finite()
        && event.timestamp >= last_timestamp
        && event.keycode != Some(0)
        && !(event.keycode.is_none() && event.modifiers.is_empty())
}

/// Waits until `deadline` unless cancellation is signalled first; returns
/// `true` when cancelled.
///
/// The `watch` signal wakes the select immediately, so worst-case
/// cancellation latency is scheduler latency, not the longest inter-event
/// gap in the recording.
async fn sleep_until_or_cancelled(deadline: Instant, cancel: &mut watch::Receiver<bool>) -> bool {
    if *cancel.borrow() {
        return true;
    }
    loop {
        tokio::select! {
            // Cancellation wins when both branches are ready: an event due at
            // the same instant as a stop request must not be applied.
            biased;
            changed = cancel.changed() => {
                match changed {
                    Ok(()) => {
                        if *cancel.borrow() {
                            return true;
                        }
                    }
                    // Every sender gone means the engine is shutting down.
                    Err(_) => return true,
                }
            }
            _ = tokio::time::sleep_until(deadline) => return false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::keyboard_engine::KeyboardEngine;
    use crate::infrastructure::sink::mock::MockReportSink;
    use crate::infrastructure::sink::ReportSink;
    use hidpilot_core::{Modifiers, REPORT_LEN};

    fn event(timestamp: f64, kind: EventKind, keycode: Option<u8>) -> KeyEvent {
        KeyEvent {
            timestamp,
            kind,
            modifiers: Modifiers::NONE,
            keycode,
        }
    }

    fn setup() -> (PlaybackController, KeyboardHandle, Arc<MockReportSink>) {
        let sink = Arc::new(MockReportSink::new());
        let (handle, _task) = KeyboardEngine::spawn(Arc::clone(&sink) as Arc<dyn ReportSink>);
        (PlaybackController::new(handle.clone()), handle, sink)
    }

    // ── Pacing ────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_replay_applies_events_in_order_with_original_timing() {
        // Arrange
        let (mut controller, _handle, sink) = setup();
        let recording = Recording::from_events(vec![
            event(0.0, EventKind::Press, Some(0x04)),
            event(0.1, EventKind::Release, Some(0x04)),
        ]);
        let start = Instant::now();

        // Act
        controller.start(recording).await.unwrap();
        let outcome = controller.wait().await;

        // Assert
        assert_eq!(outcome, Some(PlaybackOutcome::Completed));
        let reports = sink.timed_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].1, [0, 0, 0x04, 0, 0, 0, 0, 0]);
        assert_eq!(reports[1].1, [0u8; REPORT_LEN]);

        // Pacing: press at ≈T, release at ≈T+0.1, within a 20ms tolerance.
        assert!(reports[0].0.duration_since(start) < Duration::from_millis(20));
        let second = reports[1].0.duration_since(start);
        assert!(second >= Duration::from_millis(100), "release applied too early");
        assert!(second < Duration::from_millis(120), "release applied too late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_replay_leaves_the_final_state_as_is() {
        // Arrange – the recording ends while a key is still held
        let (mut controller, _handle, sink) = setup();
        let recording = Recording::from_events(vec![event(0.0, EventKind::Press, Some(0x04))]);

        // Act
        controller.start(recording).await.unwrap();
        let outcome = controller.wait().await;

        // Assert – no implicit release on normal completion
        assert_eq!(outcome, Some(PlaybackOutcome::Completed));
        assert_eq!(sink.last_report(), Some([0, 0, 0x04, 0, 0, 0, 0, 0]));
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_replay_releases_everything_and_applies_nothing_more() {
        // Arrange – second event is scheduled far in the future
        let (mut controller, _handle, sink) = setup();
        let recording = Recording::from_events(vec![
            event(0.0, EventKind::Press, Some(0x04)),
            event(5.0, EventKind::Release, Some(0x04)),
        ]);
        controller.start(recording).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        let outcome = controller.stop().await;

        // Assert – the press was applied, then only the fail-safe release
        assert_eq!(outcome, Some(PlaybackOutcome::Cancelled));
        assert_eq!(
            sink.reports(),
            vec![[0, 0, 0x04, 0, 0, 0, 0, 0], [0u8; REPORT_LEN]]
        );
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_stop_without_a_running_replay_is_a_noop() {
        let (mut controller, _handle, _sink) = setup();
        assert_eq!(controller.stop().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_starting_a_second_replay_cancels_the_first_without_interleaving() {
        // Arrange
        let (mut controller, _handle, sink) = setup();
        let first = Recording::from_events(vec![
            event(0.0, EventKind::Press, Some(0x04)),
            event(10.0, EventKind::Release, Some(0x04)),
        ]);
        let second = Recording::from_events(vec![
            event(0.0, EventKind::Press, Some(0x05)),
            event(0.05, EventKind::Release, Some(0x05)),
        ]);

        // Act
        controller.start(first).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.start(second).await.unwrap();
        let outcome = controller.wait().await;

        // Assert – first replay's press, its fail-safe release, then the
        // second replay in full; never two writers at once
        assert_eq!(outcome, Some(PlaybackOutcome::Completed));
        assert_eq!(
            sink.reports(),
            vec![
                [0, 0, 0x04, 0, 0, 0, 0, 0],
                [0u8; REPORT_LEN],
                [0, 0, 0x05, 0, 0, 0, 0, 0],
                [0u8; REPORT_LEN],
            ]
        );
    }

    // ── Live pre-emption ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_live_input_preempts_a_running_replay() {
        // Arrange
        let (mut controller, handle, sink) = setup();
        let recording = Recording::from_events(vec![
            event(0.0, EventKind::Press, Some(0x04)),
            event(30.0, EventKind::Release, Some(0x04)),
        ]);
        controller.start(recording).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act – the operator types while the replay is sleeping
        handle.press(Modifiers::NONE, Some(0x05)).await.unwrap();
        let outcome = controller.wait().await;

        // Assert – replay key released by the engine, live key survives,
        // and no replay event is applied after the pre-emption
        assert_eq!(outcome, Some(PlaybackOutcome::Cancelled));
        assert_eq!(
            sink.reports(),
            vec![
                [0, 0, 0x04, 0, 0, 0, 0, 0],
                [0u8; REPORT_LEN],
                [0, 0, 0x05, 0, 0, 0, 0, 0],
            ]
        );
    }

    // ── Abort paths ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_empty_recording_is_rejected() {
        let (mut controller, _handle, _sink) = setup();
        let result = controller.start(Recording::new()).await;
        assert_eq!(result, Err(PlaybackError::EmptyRecording));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_event_aborts_the_whole_replay() {
        // Arrange – keycode 0 cannot come out of a healthy capture
        let (mut controller, _handle, sink) = setup();
        let recording = Recording::from_events(vec![
            event(0.0, EventKind::Press, Some(0x04)),
            event(0.01, EventKind::Press, Some(0)),
            event(0.02, EventKind::Release, Some(0x04)),
        ]);

        // Act
        controller.start(recording).await.unwrap();
        let outcome = controller.wait().await;

        // Assert – abort, not skip-and-continue; fail-safe release ran
        assert_eq!(
            outcome,
            Some(PlaybackOutcome::Aborted(PlaybackError::MalformedEvent {
                index: 1
            }))
        );
        assert_eq!(
            sink.reports(),
            vec![[0, 0, 0x04, 0, 0, 0, 0, 0], [0u8; REPORT_LEN]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_mid_replay_aborts_and_clears_held_keys() {
        // Arrange
        let (mut controller, handle, sink) = setup();
        let recording = Recording::from_events(vec![
            event(0.0, EventKind::Press, Some(0x04)),
            event(0.05, EventKind::Press, Some(0x06)),
            event(10.0, EventKind::Release, Some(0x04)),
        ]);
        controller.start(recording).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Act – the device starts failing before the second event lands
        sink.set_should_fail(true);
        let outcome = controller.wait().await;
        sink.set_should_fail(false);

        // Assert – the engine cancelled the session on the failed step
        assert_eq!(outcome, Some(PlaybackOutcome::Cancelled));

        // The fail-safe release could not reach the device, but the engine
        // state was cleared: the next live press carries only its own key.
        handle.press(Modifiers::NONE, Some(0x07)).await.unwrap();
        assert_eq!(sink.last_report(), Some([0, 0, 0x07, 0, 0, 0, 0, 0]));
    }
}
