//! # hidpilot-core
//!
//! Pure domain library for HIDPilot: keyboard state tracking, USB HID boot
//! report encoding, and the record/replay event model.
//!
//! This crate is used by the gadget daemon and by any future control-channel
//! front end. It has zero dependencies on OS APIs, async runtimes, or the
//! filesystem, which keeps every rule in it unit-testable.
//!
//! # Architecture overview (for beginners)
//!
//! HIDPilot turns a small Linux board into a USB keyboard: a remote operator
//! sends key press/release notifications, and the daemon writes the matching
//! HID reports into a USB gadget device node so the attached host believes a
//! physical keyboard is typing.
//!
//! This crate (`hidpilot-core`) is the shared foundation. It defines:
//!
//! - **`domain::report`** – The [`KeyboardState`] that tracks which modifiers
//!   and keys are currently held, and the encoder that turns that state into
//!   the fixed 8-byte boot-protocol report the host consumes.
//!
//! - **`domain::recording`** – The timestamped [`KeyEvent`] log: the
//!   [`Recorder`] state machine that captures events while armed, and the
//!   [`Recording`] normalization that rebases timestamps so replay starts
//!   at zero.

// Declare the top-level module. Rust will look for it in a subdirectory with
// the same name (src/domain/mod.rs).
pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `hidpilot_core::KeyboardState` instead of the full module path.
pub use domain::recording::{EventKind, KeyEvent, Recorder, RecorderError, Recording};
pub use domain::report::{HidReport, KeyboardState, Modifiers, MAX_ACTIVE_KEYS, REPORT_LEN};
