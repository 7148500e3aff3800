//! Mock report sink for unit and integration testing.
//!
//! # Why a mock sink?
//!
//! The real sink writes into a kernel gadget device node that:
//!
//! - Only exists on a board with the USB gadget function configured.
//! - Actually types on whatever host is attached to the test machine.
//! - Cannot be observed from Rust test code.
//!
//! The `MockReportSink` replaces the device write with in-memory recording.
//! Each report is stored together with the `tokio::time::Instant` at which
//! it arrived, so tests can assert both the exact byte sequences and the
//! replay pacing (under `start_paused` runtimes the instants are
//! deterministic).
//!
//! # Failure injection
//!
//! `set_should_fail(true)` makes every subsequent write return
//! [`SinkError::Rejected`], which lets callers exercise the error paths
//! without a broken device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use hidpilot_core::HidReport;
use tokio::time::Instant;

use super::{ReportSink, SinkError};

/// A sink that records all reports without touching hardware.
#[derive(Default)]
pub struct MockReportSink {
    reports: Mutex<Vec<(Instant, HidReport)>>,
    should_fail: AtomicBool,
}

impl MockReportSink {
    /// Creates an empty mock sink that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded reports in write order.
    pub fn reports(&self) -> Vec<HidReport> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(_, report)| *report)
            .collect()
    }

    /// Returns the recorded reports together with their arrival instants.
    pub fn timed_reports(&self) -> Vec<(Instant, HidReport)> {
        self.reports.lock().unwrap().clone()
    }

    /// Returns the most recently written report, if any.
    pub fn last_report(&self) -> Option<HidReport> {
        self.reports.lock().unwrap().last().map(|(_, report)| *report)
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().unwrap().is_empty()
    }

    /// When `true`, every subsequent write fails with [`SinkError::Rejected`].
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }
}

impl ReportSink for MockReportSink {
    fn write_report(&self, report: &HidReport) -> Result<(), SinkError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected("injected failure".to_string()));
        }
        self.reports.lock().unwrap().push((Instant::now(), *report));
        Ok(())
    }
}
