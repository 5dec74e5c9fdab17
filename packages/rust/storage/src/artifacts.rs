//! Per-subject artifact files.
//!
//! Each subject owns at most one file in the artifacts directory: either
//! `client_<id>_analysis.json` (the merged records) or
//! `client_<id>_diagnostic.json` (why no records were produced). Files are
//! fully replaced on every write.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tourledger_shared::{InteractionRecord, Result, SubjectId, TourLedgerError};

/// Why a subject produced no records, as persisted for later triage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Failure class, e.g. `oracle_error` or `malformed`.
    pub kind: String,
    pub cause: String,
    /// The oracle text exactly as received.
    pub raw_response: String,
}

/// On-disk shape of a diagnostic artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticArtifact {
    pub client_id: SubjectId,
    pub kind: String,
    pub cause: String,
    pub raw_response: String,
    pub transcript_hash: String,
    pub recorded_at: String,
}

/// Directory of per-subject artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn analysis_path(&self, subject: &SubjectId) -> PathBuf {
        self.dir
            .join(format!("client_{}_analysis.json", file_stem(subject)))
    }

    pub fn diagnostic_path(&self, subject: &SubjectId) -> PathBuf {
        self.dir
            .join(format!("client_{}_diagnostic.json", file_stem(subject)))
    }

    /// Replace the subject's analysis artifact, removing any diagnostic.
    pub fn write_analysis(
        &self,
        subject: &SubjectId,
        records: &[InteractionRecord],
    ) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| TourLedgerError::Storage(format!("serialize records: {e}")))?;
        let target = self.analysis_path(subject);
        write_atomic(&target, &json)?;
        remove_if_present(&self.diagnostic_path(subject))?;
        debug!(subject = %subject, records = records.len(), path = %target.display(), "wrote analysis artifact");
        Ok(target)
    }

    /// Replace the subject's diagnostic artifact.
    ///
    /// Any analysis artifact is removed unless `keep_analysis` is set, which
    /// callers use when the analysis still backs rows in the master ledger.
    pub fn write_diagnostic(
        &self,
        subject: &SubjectId,
        diagnostic: &Diagnostic,
        transcript_hash: &str,
        keep_analysis: bool,
    ) -> Result<PathBuf> {
        let artifact = DiagnosticArtifact {
            client_id: subject.clone(),
            kind: diagnostic.kind.clone(),
            cause: diagnostic.cause.clone(),
            raw_response: diagnostic.raw_response.clone(),
            transcript_hash: transcript_hash.to_string(),
            recorded_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&artifact)
            .map_err(|e| TourLedgerError::Storage(format!("serialize diagnostic: {e}")))?;
        let target = self.diagnostic_path(subject);
        write_atomic(&target, &json)?;
        if !keep_analysis {
            remove_if_present(&self.analysis_path(subject))?;
        }
        debug!(subject = %subject, kind = %diagnostic.kind, path = %target.display(), "wrote diagnostic artifact");
        Ok(target)
    }

    /// Read back a subject's analysis artifact, if one exists.
    pub fn read_analysis(&self, subject: &SubjectId) -> Result<Option<Vec<InteractionRecord>>> {
        let path = self.analysis_path(subject);
        read_json(&path)
    }

    /// Read back a subject's diagnostic artifact, if one exists.
    pub fn read_diagnostic(&self, subject: &SubjectId) -> Result<Option<DiagnosticArtifact>> {
        let path = self.diagnostic_path(subject);
        read_json(&path)
    }
}

/// Write `contents` to a sibling temp file, then rename it over `target`.
pub(crate) fn write_atomic(target: &Path, contents: &str) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| TourLedgerError::Storage(format!("no parent for {}", target.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| TourLedgerError::io(parent, e))?;

    let filename = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| TourLedgerError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| TourLedgerError::io(target, e))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TourLedgerError::io(path, e)),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TourLedgerError::io(path, e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| TourLedgerError::parse(format!("{}: {e}", path.display())))
}

/// Subject id made safe for use in a file name.
fn file_stem(subject: &SubjectId) -> String {
    subject
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
