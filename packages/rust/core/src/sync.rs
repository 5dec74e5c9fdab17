//! Batch orchestrator.
//!
//! One batch walks a fixed sequence of states:
//!
//! `Idle → LoadingWatermark → SelectingSubjects → ProcessingSubject(i) →
//! ComputingSummary → PersistingWatermark → Idle`
//!
//! Subjects are handled one at a time, oldest first. Oracle and parse
//! failures become diagnostic artifacts and the batch moves on. Losing the
//! message source (after one reconnect attempt) aborts the batch with the
//! watermark untouched, so unfinished subjects are picked up next run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tourledger_extract::{FailureKind, extract};
use tourledger_oracle::{ExtractionAdapter, Oracle, OracleReply};
use tourledger_shared::{Result, SubjectId, SubjectRef, SyncConfig, TourLedgerError};
use tourledger_source::MessageSource;
use tourledger_storage::{Diagnostic, Ledger, LedgerSummary, SubjectOutcome, WatermarkStore};

use crate::progress::ProgressReporter;

/// Diagnostic kind for a subject with no message text.
const NO_MESSAGES: &str = "no_messages";

/// Diagnostic kind for a subject that failed outside the oracle and parser.
const SUBJECT_ERROR: &str = "error";

/// Where the orchestrator is in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    LoadingWatermark,
    SelectingSubjects,
    /// Zero-based position in the selected subjects.
    ProcessingSubject(usize),
    ComputingSummary,
    PersistingWatermark,
}

impl SyncState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::LoadingWatermark => "Loading watermark",
            Self::SelectingSubjects => "Selecting subjects",
            Self::ProcessingSubject(_) => "Processing subjects",
            Self::ComputingSummary => "Computing summary",
            Self::PersistingWatermark => "Persisting watermark",
        }
    }
}

/// How one subject ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectStatus {
    /// Already in the master ledger; nothing was done.
    Skipped,
    /// Records were extracted. `appended` is 0 when the master ledger
    /// already held the subject.
    Recorded { records: usize, appended: usize },
    /// No records; a diagnostic artifact was written.
    Diagnostic { kind: String, cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectReport {
    pub subject: SubjectId,
    #[serde(flatten)]
    pub status: SubjectStatus,
    pub artifact: Option<PathBuf>,
}

/// Outcome of one completed batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub previous_watermark: DateTime<Utc>,
    pub watermark: DateTime<Utc>,
    pub subjects: Vec<SubjectReport>,
    /// `None` when the ledger summary could not be computed.
    pub summary: Option<LedgerSummary>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn recorded(&self) -> usize {
        self.count(|s| matches!(s, SubjectStatus::Recorded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, SubjectStatus::Skipped))
    }

    pub fn diagnostics(&self) -> usize {
        self.count(|s| matches!(s, SubjectStatus::Diagnostic { .. }))
    }

    pub fn appended(&self) -> usize {
        self.subjects
            .iter()
            .map(|r| match r.status {
                SubjectStatus::Recorded { appended, .. } => appended,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&SubjectStatus) -> bool) -> usize {
        self.subjects.iter().filter(|r| pred(&r.status)).count()
    }
}

/// Owns the message-source connection, the oracle, and the ledger for the
/// lifetime of a run.
pub struct SyncOrchestrator<'a, S, O> {
    config: &'a SyncConfig,
    source: S,
    adapter: ExtractionAdapter<O>,
    ledger: Ledger,
    watermark: WatermarkStore,
    state: SyncState,
}

impl<'a, S: MessageSource, O: Oracle> SyncOrchestrator<'a, S, O> {
    /// Open the ledger and watermark named by `config`.
    pub async fn open(config: &'a SyncConfig, source: S, oracle: O) -> Result<Self> {
        let ledger = Ledger::open(&config.ledger_path, &config.artifacts_dir).await?;
        Ok(Self {
            config,
            source,
            adapter: ExtractionAdapter::new(oracle, config.max_transcript_chars),
            ledger,
            watermark: WatermarkStore::new(&config.watermark_path),
            state: SyncState::Idle,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn oracle(&self) -> &O {
        self.adapter.oracle()
    }

    pub fn watermark(&self) -> &WatermarkStore {
        &self.watermark
    }

    fn enter(&mut self, next: SyncState, progress: &dyn ProgressReporter) {
        if self.state.label() != next.label() {
            progress.phase(next.label());
        }
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Return to `Idle` after a fatal error.
    fn abort<T>(&mut self, error: TourLedgerError) -> Result<T> {
        warn!(state = ?self.state, error = %error, "batch aborted, watermark unchanged");
        self.state = SyncState::Idle;
        Err(error)
    }

    /// Run one incremental batch.
    #[instrument(skip_all, fields(source = %self.source.name(), model = %self.adapter.oracle().model()))]
    pub async fn run_batch(&mut self, progress: &dyn ProgressReporter) -> Result<BatchReport> {
        let start = Instant::now();

        self.enter(SyncState::LoadingWatermark, progress);
        let previous = self.watermark.load();

        self.enter(SyncState::SelectingSubjects, progress);
        if let Err(e) = self.ensure_live().await {
            return self.abort(e);
        }
        let subjects = match self.select_subjects(previous).await {
            Ok(subjects) => subjects,
            Err(e) => return self.abort(e),
        };
        info!(
            count = subjects.len(),
            since = %previous.to_rfc3339(),
            "selected subjects"
        );

        let total = subjects.len();
        let mut reports = Vec::with_capacity(total);
        for (i, subject) in subjects.iter().enumerate() {
            self.enter(SyncState::ProcessingSubject(i), progress);
            if let Err(e) = self.ensure_live().await {
                return self.abort(e);
            }
            progress.subject_started(&subject.id, i + 1, total);

            let report = match self.process_retrying(&subject.id, true).await {
                Ok(report) => report,
                Err(e) if e.is_fatal() => return self.abort(e),
                Err(e) => {
                    warn!(subject = %subject.id, error = %e, "subject failed, continuing");
                    match self.record_error(&subject.id, &e).await {
                        Ok(report) => report,
                        Err(e) => return self.abort(e),
                    }
                }
            };
            progress.subject_finished(&report);
            reports.push(report);
        }

        self.enter(SyncState::ComputingSummary, progress);
        let summary = match self.ledger.summary().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "ledger summary unavailable");
                None
            }
        };

        self.enter(SyncState::PersistingWatermark, progress);
        let watermark = match self.watermark.advance(previous, Utc::now()) {
            Ok(at) => at,
            Err(e) => return self.abort(e),
        };

        self.enter(SyncState::Idle, progress);
        let report = BatchReport {
            previous_watermark: previous,
            watermark,
            subjects: reports,
            summary,
            elapsed: start.elapsed(),
        };
        info!(
            subjects = report.subjects.len(),
            recorded = report.recorded(),
            skipped = report.skipped(),
            diagnostics = report.diagnostics(),
            appended = report.appended(),
            watermark = %report.watermark.to_rfc3339(),
            "batch complete"
        );
        Ok(report)
    }

    /// Process one subject now, ignoring the watermark and the skip check.
    ///
    /// The master ledger still receives the subject at most once.
    #[instrument(skip_all, fields(subject = %subject))]
    pub async fn process_subject(
        &mut self,
        subject: &SubjectId,
        progress: &dyn ProgressReporter,
    ) -> Result<SubjectReport> {
        self.enter(SyncState::ProcessingSubject(0), progress);
        if let Err(e) = self.ensure_live().await {
            return self.abort(e);
        }
        progress.subject_started(subject, 1, 1);

        let result = self.process_retrying(subject, false).await;
        self.state = SyncState::Idle;
        let report = result?;
        progress.subject_finished(&report);
        Ok(report)
    }

    /// Probe the source, reconnecting once if it is down.
    async fn ensure_live(&mut self) -> Result<()> {
        if self.source.is_live().await {
            return Ok(());
        }

        warn!(source = %self.source.name(), "message source not live, reconnecting");
        self.reconnect().await
    }

    /// One reconnect attempt, confirmed by the liveness probe.
    async fn reconnect(&mut self) -> Result<()> {
        match self.source.reconnect().await {
            Ok(()) if self.source.is_live().await => {
                info!("message source reconnected");
                Ok(())
            }
            Ok(()) => Err(TourLedgerError::Connectivity(
                "message source still down after reconnect".into(),
            )),
            Err(e @ TourLedgerError::Connectivity(_)) => Err(e),
            Err(e) => Err(TourLedgerError::Connectivity(e.to_string())),
        }
    }

    /// Subject selection, retried once after a reconnect when the query
    /// itself loses the connection.
    async fn select_subjects(&mut self, cursor: DateTime<Utc>) -> Result<Vec<SubjectRef>> {
        match self.source.subjects_since(cursor).await {
            Err(TourLedgerError::Connectivity(cause)) => {
                warn!(%cause, "subject query lost the connection, reconnecting");
                self.reconnect().await?;
                self.source.subjects_since(cursor).await
            }
            other => other,
        }
    }

    /// [`Self::process`], retried once after a reconnect when a message
    /// fetch loses the connection. Connectivity errors only come from the
    /// source, which is read before the oracle is called.
    async fn process_retrying(
        &mut self,
        subject: &SubjectId,
        skip_existing: bool,
    ) -> Result<SubjectReport> {
        match self.process(subject, skip_existing).await {
            Err(TourLedgerError::Connectivity(cause)) => {
                warn!(
                    subject = %subject,
                    %cause,
                    "message fetch lost the connection, reconnecting"
                );
                self.reconnect().await?;
                self.process(subject, skip_existing).await
            }
            other => other,
        }
    }

    /// Write a diagnostic for a subject that failed with a recoverable error.
    async fn record_error(
        &self,
        subject: &SubjectId,
        error: &TourLedgerError,
    ) -> Result<SubjectReport> {
        let diagnostic = Diagnostic {
            kind: SUBJECT_ERROR.into(),
            cause: error.to_string(),
            raw_response: String::new(),
        };
        let append = self
            .ledger
            .append_subject(subject, &SubjectOutcome::Diagnostic(diagnostic.clone()), "")
            .await?;
        Ok(SubjectReport {
            subject: subject.clone(),
            status: SubjectStatus::Diagnostic {
                kind: diagnostic.kind,
                cause: diagnostic.cause,
            },
            artifact: Some(append.artifact),
        })
    }

    async fn process(&self, subject: &SubjectId, skip_existing: bool) -> Result<SubjectReport> {
        if skip_existing && self.ledger.exists(subject).await? {
            debug!(subject = %subject, "already in master ledger, skipping");
            return Ok(SubjectReport {
                subject: subject.clone(),
                status: SubjectStatus::Skipped,
                artifact: None,
            });
        }

        let messages = self.source.messages_for(subject).await?;
        let transcript = self.adapter.transcript(&messages);

        let outcome = if transcript.is_empty() {
            SubjectOutcome::Diagnostic(Diagnostic {
                kind: NO_MESSAGES.into(),
                cause: format!("{} messages with no text", messages.len()),
                raw_response: String::new(),
            })
        } else {
            match self.adapter.extract(&transcript).await {
                OracleReply::Ok(raw) => match extract(&raw, subject) {
                    Ok(records) => SubjectOutcome::Records(records),
                    Err(failure) => SubjectOutcome::Diagnostic(Diagnostic {
                        kind: failure.kind.as_str().into(),
                        cause: failure.cause,
                        raw_response: failure.raw,
                    }),
                },
                OracleReply::Failed(cause) => SubjectOutcome::Diagnostic(Diagnostic {
                    kind: FailureKind::OracleError.as_str().into(),
                    raw_response: cause.clone(),
                    cause,
                }),
            }
        };

        if let SubjectOutcome::Diagnostic(diagnostic) = &outcome {
            warn!(
                subject = %subject,
                kind = %diagnostic.kind,
                cause = %diagnostic.cause,
                "no records extracted, writing diagnostic"
            );
        }

        let append = self
            .ledger
            .append_subject(subject, &outcome, &transcript.hash)
            .await?;

        let status = match outcome {
            SubjectOutcome::Records(records) => SubjectStatus::Recorded {
                records: records.len(),
                appended: append.appended,
            },
            SubjectOutcome::Diagnostic(diagnostic) => SubjectStatus::Diagnostic {
                kind: diagnostic.kind,
                cause: diagnostic.cause,
            },
        };

        debug!(subject = %subject, model = %self.config.model, ?status, "subject done");
        Ok(SubjectReport {
            subject: subject.clone(),
            status,
            artifact: Some(append.artifact),
        })
    }
}
