//! The production report sink: a USB HID gadget device node.
//!
//! On a board configured with the `g_hid` / configfs keyboard gadget
//! function, the kernel exposes a character device (`/dev/hidg0` by
//! default). Each 8-byte write to it is delivered to the attached host as
//! one keyboard report.
//!
//! The node is opened per report: a report write is a single short
//! transaction, and reopening means the sink recovers on its own after the
//! host re-enumerates the gadget.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use hidpilot_core::HidReport;
use tracing::trace;

use super::{ReportSink, SinkError};

/// Writes boot reports into a gadget device node.
pub struct GadgetSink {
    path: PathBuf,
}

impl GadgetSink {
    /// Creates a sink for the given device node path (e.g. `/dev/hidg0`).
    ///
    /// The path is not opened until the first report is written, so
    /// constructing the sink never fails.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the device node path this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for GadgetSink {
    fn write_report(&self, report: &HidReport) -> Result<(), SinkError> {
        let mut device = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|source| SinkError::Io {
                path: self.path.clone(),
                source,
            })?;

        device.write_all(report).map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;

        trace!(?report, "report written to gadget");
        Ok(())
    }
}
