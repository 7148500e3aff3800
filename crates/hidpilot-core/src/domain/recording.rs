//! The record/replay event model: timestamped key events, recordings, and
//! the recorder state machine.
//!
//! A [`Recording`] is an ordered log of press/release events. While being
//! captured the timestamps are absolute wall-clock seconds; on stop the log
//! is normalized so the first event sits at `t = 0` and replay pacing only
//! has to deal with non-negative, non-decreasing offsets.
//!
//! Timestamps enter this module as plain `f64` seconds supplied by the
//! caller. Keeping the clock out of the domain makes normalization and the
//! recorder state machine fully deterministic under test.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::report::Modifiers;

// ── Event model ───────────────────────────────────────────────────────────────

/// Whether a recorded event was a key press or a key release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Press,
    Release,
}

/// One captured key event.
///
/// The serialized field names (`timestamp`, `event`, `control_keys`,
/// `keycode`) are the on-disk recording format and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Seconds; absolute while recording, relative to the first event after
    /// normalization.
    pub timestamp: f64,
    #[serde(rename = "event")]
    pub kind: EventKind,
    #[serde(rename = "control_keys")]
    pub modifiers: Modifiers,
    /// The held keycode, or `null` for a modifier-only event.
    pub keycode: Option<u8>,
}

/// An ordered sequence of [`KeyEvent`]s.
///
/// Serializes as a bare JSON array, which is the recording file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recording {
    events: Vec<KeyEvent>,
}

impl Recording {
    /// Creates an empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a recording from an already-ordered event list.
    pub fn from_events(events: Vec<KeyEvent>) -> Self {
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Appends an event to the log.
    pub fn push(&mut self, event: KeyEvent) {
        self.events.push(event);
    }

    /// Returns the events in order.
    pub fn events(&self) -> &[KeyEvent] {
        &self.events
    }

    /// Timestamp of the last event, i.e. the replay duration in seconds.
    pub fn duration(&self) -> f64 {
        self.events.last().map(|e| e.timestamp).unwrap_or(0.0)
    }

    /// Rebases all timestamps so the first event sits at `t = 0`.
    ///
    /// The system clock is not monotonic: if it stepped backwards during the
    /// capture, a raw subtraction would produce a timestamp smaller than its
    /// predecessor. Such a delta is clamped to 0 (the event inherits the
    /// previous timestamp) so the normalized sequence is always non-negative
    /// and non-decreasing.
    pub fn normalize(&mut self) {
        let Some(first) = self.events.first() else {
            return;
        };
        let base = first.timestamp;

        let mut previous = 0.0;
        for event in &mut self.events {
            let shifted = event.timestamp - base;
            event.timestamp = if shifted < previous { previous } else { shifted };
            previous = event.timestamp;
        }
    }
}

// ── Recorder state machine ────────────────────────────────────────────────────

/// Error type for recorder session management.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("a recording session is already in progress")]
    AlreadyRecording,
    #[error("no recording session is in progress")]
    NotRecording,
}

/// The two recorder states. An armed recorder owns the log it is filling.
#[derive(Debug)]
enum RecorderState {
    Idle,
    Recording(Recording),
}

/// Captures key events into a [`Recording`] while armed.
///
/// The state machine is explicit so a second `start` cannot silently reset an
/// in-progress capture; the caller gets [`RecorderError::AlreadyRecording`]
/// and the running session is left untouched.
#[derive(Debug)]
pub struct Recorder {
    state: RecorderState,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    /// Creates an idle recorder.
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
        }
    }

    /// Returns `true` while a capture session is in progress.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, RecorderState::Recording(_))
    }

    /// Arms the recorder with a fresh, empty log.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::AlreadyRecording`] if a session is already in
    /// progress; that session keeps running.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        match self.state {
            RecorderState::Recording(_) => Err(RecorderError::AlreadyRecording),
            RecorderState::Idle => {
                self.state = RecorderState::Recording(Recording::new());
                Ok(())
            }
        }
    }

    /// Logs a press event at `timestamp` (absolute wall-clock seconds).
    /// No-op when idle.
    pub fn on_press(&mut self, modifiers: Modifiers, keycode: Option<u8>, timestamp: f64) {
        self.append(EventKind::Press, modifiers, keycode, timestamp);
    }

    /// Logs a release event at `timestamp`. No-op when idle.
    pub fn on_release(&mut self, modifiers: Modifiers, keycode: Option<u8>, timestamp: f64) {
        self.append(EventKind::Release, modifiers, keycode, timestamp);
    }

    fn append(&mut self, kind: EventKind, modifiers: Modifiers, keycode: Option<u8>, timestamp: f64) {
        if let RecorderState::Recording(log) = &mut self.state {
            log.push(KeyEvent {
                timestamp,
                kind,
                modifiers,
                keycode,
            });
        }
    }

    /// Disarms the recorder and returns the normalized capture.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::NotRecording`] if no session is in progress.
    pub fn stop_and_normalize(&mut self) -> Result<Recording, RecorderError> {
        match std::mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Idle => Err(RecorderError::NotRecording),
            RecorderState::Recording(mut log) => {
                log.normalize();
                Ok(log)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
