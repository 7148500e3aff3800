//! Report sink abstraction: where encoded HID reports go.
//!
//! The engine writes through the narrow [`ReportSink`] capability so the
//! whole keyboard pipeline can be exercised against [`mock::MockReportSink`]
//! without gadget hardware. The production implementation is
//! [`gadget::GadgetSink`].

use std::path::PathBuf;

use hidpilot_core::HidReport;
use thiserror::Error;

pub mod gadget;
pub mod mock;

/// Error type for report sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The device node could not be opened or written.
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The sink refused the report (test sinks use this for injected failures).
    #[error("sink rejected report: {0}")]
    Rejected(String),
}

/// A destination for encoded boot reports.
///
/// Implementations must accept exactly [`hidpilot_core::REPORT_LEN`] bytes
/// per call; the type signature enforces it. A failed write fails the
/// triggering operation; the engine never retries or buffers.
pub trait ReportSink: Send + Sync {
    /// Writes one 8-byte boot report.
    fn write_report(&self, report: &HidReport) -> Result<(), SinkError>;
}
