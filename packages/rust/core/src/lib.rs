//! Incremental sync orchestration for tourledger.
//!
//! This crate ties the message source, extraction oracle, record pipeline,
//! and ledger into one batch operation ([`SyncOrchestrator::run_batch`]) and
//! one on-demand operation ([`SyncOrchestrator::process_subject`]).

pub mod progress;
pub mod sync;

pub use progress::{ProgressReporter, SilentProgress};
pub use sync::{BatchReport, SubjectReport, SubjectStatus, SyncOrchestrator, SyncState};
pub use tourledger_storage::LedgerSummary;
