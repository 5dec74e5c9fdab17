//! libSQL master ledger plus per-subject artifacts and the batch watermark.
//!
//! The [`Ledger`] owns two artifact classes:
//! - the master ledger (`ledger_entries` table), append-only and keyed by
//!   `client_id`
//! - one artifact file per subject, fully replaced on every run
//!
//! **Access rules:** one writer per data directory, opened via
//! [`Ledger::open`]. Read-only consumers use [`Ledger::open_readonly`].

mod artifacts;
mod migrations;
mod watermark;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use tourledger_shared::{InteractionRecord, Result, SubjectId, TourLedgerError};

pub use artifacts::{ArtifactStore, Diagnostic, DiagnosticArtifact};
pub use watermark::{WatermarkStore, backfill_cursor};

/// What one subject's run produced.
#[derive(Debug, Clone)]
pub enum SubjectOutcome {
    Records(Vec<InteractionRecord>),
    Diagnostic(Diagnostic),
}

/// Result of [`Ledger::append_subject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReport {
    pub artifact: PathBuf,
    /// Rows added to the master ledger.
    pub appended: usize,
    /// The subject already had master entries, so none were added.
    pub already_present: bool,
}

/// One master-ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: String,
    pub client_id: SubjectId,
    pub record: InteractionRecord,
    pub transcript_hash: String,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate counts over the master ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub subjects: usize,
    pub total_records: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_tour_type: BTreeMap<String, usize>,
    pub completed_tours: usize,
}

fn storage_err(e: libsql::Error) -> TourLedgerError {
    TourLedgerError::Storage(e.to_string())
}

/// Master ledger handle wrapping a libSQL database and the artifact directory.
pub struct Ledger {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    artifacts: ArtifactStore,
}

impl Ledger {
    /// Open or create the ledger at `path` in read-write mode.
    pub async fn open(path: &Path, artifacts_dir: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TourLedgerError::io(parent, e))?;
        }
        std::fs::create_dir_all(artifacts_dir)
            .map_err(|e| TourLedgerError::io(artifacts_dir, e))?;

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let ledger = Self {
            db,
            conn,
            readonly: false,
            artifacts: ArtifactStore::new(artifacts_dir),
        };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Open an existing ledger read-only. A missing database is an error.
    pub async fn open_readonly(path: &Path, artifacts_dir: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TourLedgerError::Storage(format!(
                "ledger not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            artifacts: ArtifactStore::new(artifacts_dir),
        })
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        TourLedgerError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(TourLedgerError::Storage(
                "ledger is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Whether the subject already has rows in the master ledger.
    pub async fn exists(&self, subject: &SubjectId) -> Result<bool> {
        count_for(&self.conn, subject).await.map(|n| n > 0)
    }

    /// Persist one subject's outcome.
    ///
    /// Records replace the analysis artifact and are appended to the master
    /// ledger in one transaction, unless the subject is already present
    /// there. A diagnostic never touches the master ledger; it replaces the
    /// analysis artifact only for subjects not yet in the master ledger.
    #[instrument(skip_all, fields(subject = %subject))]
    pub async fn append_subject(
        &self,
        subject: &SubjectId,
        outcome: &SubjectOutcome,
        transcript_hash: &str,
    ) -> Result<AppendReport> {
        self.check_writable()?;

        let records = match outcome {
            SubjectOutcome::Diagnostic(diagnostic) => {
                // A subject already in the master ledger keeps the analysis
                // its rows came from.
                let already_present = self.exists(subject).await?;
                let artifact = self.artifacts.write_diagnostic(
                    subject,
                    diagnostic,
                    transcript_hash,
                    already_present,
                )?;
                return Ok(AppendReport {
                    artifact,
                    appended: 0,
                    already_present,
                });
            }
            SubjectOutcome::Records(records) => records,
        };

        let artifact = self.artifacts.write_analysis(subject, records)?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        if count_for(&tx, subject).await? > 0 {
            tx.rollback().await.map_err(storage_err)?;
            debug!("subject already in master ledger, skipping append");
            return Ok(AppendReport {
                artifact,
                appended: 0,
                already_present: true,
            });
        }

        let recorded_at = Utc::now().to_rfc3339();
        for record in records {
            let record_json = serde_json::to_string(record)
                .map_err(|e| TourLedgerError::Storage(format!("serialize record: {e}")))?;
            tx.execute(
                "INSERT INTO ledger_entries (id, client_id, building_key, building_name,
                    tour_status, tour_type, sent_method, tour_completed, schema_version,
                    record_json, transcript_hash, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    Uuid::now_v7().to_string(),
                    subject.as_str(),
                    record.entity_key(),
                    record.building_name.as_str(),
                    record.tour_status.as_str(),
                    record.tour_type.as_str(),
                    record.sent_method.as_str(),
                    i64::from(record.tour_completed),
                    i64::from(record.schema_version),
                    record_json,
                    transcript_hash,
                    recorded_at.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;

        info!(appended = records.len(), "appended to master ledger");
        Ok(AppendReport {
            artifact,
            appended: records.len(),
            already_present: false,
        })
    }

    /// Master-ledger rows for one subject, in insertion order.
    pub async fn entries_for(&self, subject: &SubjectId) -> Result<Vec<LedgerEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, client_id, record_json, transcript_hash, recorded_at
                 FROM ledger_entries WHERE client_id = ?1 ORDER BY rowid",
                params![subject.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// Aggregate counts across all subjects.
    pub async fn summary(&self) -> Result<LedgerSummary> {
        let mut summary = LedgerSummary::default();

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(DISTINCT client_id), COUNT(*), COALESCE(SUM(tour_completed), 0)
                 FROM ledger_entries",
                params![],
            )
            .await
            .map_err(storage_err)?;
        if let Some(row) = rows.next().await.map_err(storage_err)? {
            summary.subjects = row.get::<i64>(0).map_err(storage_err)? as usize;
            summary.total_records = row.get::<i64>(1).map_err(storage_err)? as usize;
            summary.completed_tours = row.get::<i64>(2).map_err(storage_err)? as usize;
        }

        summary.by_status = self.group_counts("tour_status").await?;
        summary.by_tour_type = self.group_counts("tour_type").await?;
        Ok(summary)
    }

    async fn group_counts(&self, column: &'static str) -> Result<BTreeMap<String, usize>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {column}, COUNT(*) FROM ledger_entries GROUP BY {column}"),
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let key: String = row.get(0).map_err(storage_err)?;
            let count: i64 = row.get(1).map_err(storage_err)?;
            counts.insert(key, count as usize);
        }
        Ok(counts)
    }
}

async fn count_for(conn: &Connection, subject: &SubjectId) -> Result<i64> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM ledger_entries WHERE client_id = ?1",
            params![subject.as_str()],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => row.get::<i64>(0).map_err(storage_err),
        None => Ok(0),
    }
}

fn row_to_entry(row: &libsql::Row) -> Result<LedgerEntry> {
    let client_id: String = row.get(1).map_err(storage_err)?;
    let record_json: String = row.get(2).map_err(storage_err)?;
    let recorded_at: String = row.get(4).map_err(storage_err)?;

    Ok(LedgerEntry {
        id: row.get(0).map_err(storage_err)?,
        client_id: client_id.parse()?,
        record: serde_json::from_str(&record_json)
            .map_err(|e| TourLedgerError::Storage(format!("invalid record_json: {e}")))?,
        transcript_hash: row.get(3).map_err(storage_err)?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| TourLedgerError::Storage(format!("invalid date: {e}")))?,
    })
}
