//! libSQL mirror of the client store.
//!
//! Expects the two tables of the upstream store:
//! - `client_stage_progression(client_id, current_stage, updated_at)`
//! - `client_fub_messages(client_id, message, created_at)`
//!
//! The database is opened read-only.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database, OpenFlags, Value, params};
use tracing::{debug, info, instrument, warn};

use tourledger_shared::{Message, Result, SubjectId, SubjectRef, TourLedgerError};

use crate::{MessageSource, dedupe_subjects};

fn connectivity(e: libsql::Error) -> TourLedgerError {
    TourLedgerError::Connectivity(e.to_string())
}

pub struct LibsqlMessageSource {
    path: PathBuf,
    min_stage: i64,
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LibsqlMessageSource {
    /// Open the mirror at `path`. Subjects qualify at `min_stage` or above.
    pub async fn open(path: &Path, min_stage: i64) -> Result<Self> {
        let (db, conn) = connect(path).await?;
        info!(path = %path.display(), min_stage, "opened message source");
        Ok(Self {
            path: path.to_path_buf(),
            min_stage,
            db,
            conn,
        })
    }
}

async fn connect(path: &Path) -> Result<(Database, Connection)> {
    if !path.exists() {
        return Err(TourLedgerError::Connectivity(format!(
            "message source not found at {}",
            path.display()
        )));
    }
    let db = libsql::Builder::new_local(path)
        .flags(OpenFlags::SQLITE_OPEN_READ_ONLY)
        .build()
        .await
        .map_err(connectivity)?;
    let conn = db.connect().map_err(connectivity)?;
    Ok((db, conn))
}

impl MessageSource for LibsqlMessageSource {
    fn name(&self) -> &str {
        "libsql"
    }

    async fn is_live(&self) -> bool {
        match self.conn.query("SELECT 1", params![]).await {
            Ok(mut rows) => rows.next().await.is_ok(),
            Err(e) => {
                debug!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        let (db, conn) = connect(&self.path).await?;
        self.db = db;
        self.conn = conn;
        info!(path = %self.path.display(), "reconnected message source");
        Ok(())
    }

    #[instrument(skip_all, fields(cursor = %cursor.to_rfc3339()))]
    async fn subjects_since(&self, cursor: DateTime<Utc>) -> Result<Vec<SubjectRef>> {
        let mut rows = self
            .conn
            .query(
                "SELECT client_id, updated_at FROM client_stage_progression
                 WHERE current_stage >= ?1",
                params![self.min_stage],
            )
            .await
            .map_err(connectivity)?;

        let mut qualified = Vec::new();
        while let Some(row) = rows.next().await.map_err(connectivity)? {
            let Some(id) = subject_id(row.get_value(0).map_err(connectivity)?) else {
                continue;
            };
            let raw_time = row.get_value(1).map_err(connectivity)?;
            let Some(qualified_at) = source_time(&raw_time) else {
                warn!(subject = %id, value = ?raw_time, "unreadable updated_at, skipping");
                continue;
            };
            if qualified_at > cursor {
                qualified.push(SubjectRef { id, qualified_at });
            }
        }

        let subjects = dedupe_subjects(qualified);
        debug!(count = subjects.len(), "selected subjects");
        Ok(subjects)
    }

    async fn messages_for(&self, subject: &SubjectId) -> Result<Vec<Message>> {
        let mut rows = self
            .conn
            .query(
                "SELECT message, created_at FROM client_fub_messages
                 WHERE client_id = ?1 ORDER BY created_at, rowid",
                params![subject.as_str()],
            )
            .await
            .map_err(connectivity)?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(connectivity)? {
            let body = match row.get_value(0).map_err(connectivity)? {
                Value::Text(text) => text,
                _ => continue,
            };
            let sent_at = source_time(&row.get_value(1).map_err(connectivity)?);
            messages.push(Message { sent_at, body });
        }
        debug!(subject = %subject, count = messages.len(), "fetched messages");
        Ok(messages)
    }
}

fn subject_id(value: Value) -> Option<SubjectId> {
    match value {
        Value::Integer(id) => Some(SubjectId::from(id)),
        Value::Text(text) => text.parse().ok(),
        _ => None,
    }
}

fn source_time(value: &Value) -> Option<DateTime<Utc>> {
    let Value::Text(text) = value else {
        return None;
    };
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}
