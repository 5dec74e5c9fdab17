//! SQL migrations for the master ledger database.
//!
//! Applied in order on open. Each migration records its own version.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: ledger_entries",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only: rows are inserted once per (client, building) and never updated.
CREATE TABLE IF NOT EXISTS ledger_entries (
    id              TEXT PRIMARY KEY,
    client_id       TEXT NOT NULL,
    building_key    TEXT NOT NULL,
    building_name   TEXT NOT NULL,
    tour_status     TEXT NOT NULL,
    tour_type       TEXT NOT NULL,
    sent_method     TEXT NOT NULL,
    tour_completed  INTEGER NOT NULL DEFAULT 0,
    schema_version  INTEGER NOT NULL,
    record_json     TEXT NOT NULL,
    transcript_hash TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_client_id ON ledger_entries(client_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
