//! Read-only access to subjects and their conversation history.
//!
//! The orchestrator talks to a [`MessageSource`]. Two implementations:
//! - [`LibsqlMessageSource`]: a libSQL mirror of the client store
//! - [`MemoryMessageSource`]: in-process data with a controllable connection

mod libsql_source;
mod memory;

use chrono::{DateTime, Utc};

use tourledger_shared::{Message, Result, SubjectId, SubjectRef};

pub use libsql_source::LibsqlMessageSource;
pub use memory::MemoryMessageSource;

/// The connection the orchestrator holds for the duration of a batch.
///
/// Query failures are reported as `TourLedgerError::Connectivity`.
#[allow(async_fn_in_trait)]
pub trait MessageSource {
    /// Human-readable source name for tracing.
    fn name(&self) -> &str;

    /// Probe the connection.
    async fn is_live(&self) -> bool;

    /// Drop and re-establish the connection.
    async fn reconnect(&mut self) -> Result<()>;

    /// Subjects whose qualifying time is after `cursor`, one entry per id
    /// (latest qualifying time), oldest first.
    async fn subjects_since(&self, cursor: DateTime<Utc>) -> Result<Vec<SubjectRef>>;

    /// A subject's messages, oldest first.
    async fn messages_for(&self, subject: &SubjectId) -> Result<Vec<Message>>;
}

/// Collapse rows to one per subject (latest time) and order oldest first.
pub(crate) fn dedupe_subjects(rows: impl IntoIterator<Item = SubjectRef>) -> Vec<SubjectRef> {
    let mut latest: std::collections::HashMap<SubjectId, DateTime<Utc>> =
        std::collections::HashMap::new();
    for row in rows {
        latest
            .entry(row.id)
            .and_modify(|at| *at = (*at).max(row.qualified_at))
            .or_insert(row.qualified_at);
    }

    let mut subjects: Vec<SubjectRef> = latest
        .into_iter()
        .map(|(id, qualified_at)| SubjectRef { id, qualified_at })
        .collect();
    subjects.sort_by(|a, b| a.qualified_at.cmp(&b.qualified_at).then_with(|| a.id.cmp(&b.id)));
    subjects
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 23, hour, 0, 0).unwrap()
    }

    #[test]
    fn dedupe_keeps_latest_and_sorts_oldest_first() {
        let subjects = dedupe_subjects(vec![
            SubjectRef { id: SubjectId::from(2), qualified_at: at(9) },
            SubjectRef { id: SubjectId::from(1), qualified_at: at(8) },
            SubjectRef { id: SubjectId::from(1), qualified_at: at(11) },
            SubjectRef { id: SubjectId::from(3), qualified_at: at(10) },
        ]);

        let ids: Vec<_> = subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
        assert_eq!(subjects[2].qualified_at, at(11));
    }

    #[test]
    fn ties_break_by_id() {
        let subjects = dedupe_subjects(vec![
            SubjectRef { id: SubjectId::from(5), qualified_at: at(9) },
            SubjectRef { id: SubjectId::from(4), qualified_at: at(9) },
        ]);
        assert_eq!(subjects[0].id, SubjectId::from(4));
    }
}
