//! Progress callbacks for batch runs.

use tourledger_shared::SubjectId;

use crate::sync::SubjectReport;

/// Progress callback for reporting sync status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the orchestrator enters a new state.
    fn phase(&self, name: &str);
    /// Called before a subject is processed. `current` is 1-based.
    fn subject_started(&self, subject: &SubjectId, current: usize, total: usize);
    /// Called after a subject is persisted or skipped.
    fn subject_finished(&self, report: &SubjectReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn subject_started(&self, _subject: &SubjectId, _current: usize, _total: usize) {}
    fn subject_finished(&self, _report: &SubjectReport) {}
}
