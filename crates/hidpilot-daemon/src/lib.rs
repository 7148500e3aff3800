//! hidpilot-daemon library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the daemon do? (for beginners)
//!
//! The daemon runs on a small Linux board plugged into a host computer's USB
//! port. The board is configured as a *USB gadget*: to the host it looks like
//! an ordinary keyboard. The daemon:
//!
//! 1. Accepts key press/release notifications from a remote operator (the
//!    transport that delivers them is an external collaborator; it drives
//!    the daemon through [`MacroService`] / [`KeyboardHandle`]).
//! 2. Tracks which modifiers and keys are currently held and writes the
//!    matching 8-byte HID boot report into the gadget device node
//!    (`/dev/hidg0`) after every change.
//! 3. Can record a timestamped log of those events and replay it later with
//!    the original timing, like a keyboard macro.
//!
//! All report writes funnel through one engine task, so live input and a
//! running replay can never interleave partial state on the wire.

/// Application layer: the keyboard engine, playback worker, and macro service.
pub mod application;

/// Infrastructure layer: the gadget report sink, recording storage, and
/// daemon configuration.
pub mod infrastructure;

pub use application::keyboard_engine::{EngineError, KeyboardEngine, KeyboardHandle, PlaybackId};
pub use application::macro_service::{MacroService, ServiceError};
pub use application::playback::{PlaybackController, PlaybackError, PlaybackOutcome};
pub use infrastructure::sink::{gadget::GadgetSink, mock::MockReportSink, ReportSink, SinkError};
pub use infrastructure::storage::recordings::{RecordingStore, StoreError, DEFAULT_RECORDING_NAME};
