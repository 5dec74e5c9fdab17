//! Oracle text → merged interaction records.
//!
//! Four pure stages, each usable on its own:
//! - [`timestamp`]: heterogeneous date text → RFC 3339 or `"none"`
//! - [`sanitize`]: noisy oracle output → payload entries or [`ParseFailure`]
//! - [`normalize`]: payload entry → fully populated [`InteractionRecord`]
//! - [`merge`]: one record per building
//!
//! [`extract`] chains them for one subject.

pub mod merge;
pub mod normalize;
pub mod sanitize;
pub mod timestamp;

use tracing::{debug, instrument};

use tourledger_shared::{InteractionRecord, SubjectId};

pub use merge::{merge_pair, merge_records};
pub use normalize::normalize_entry;
pub use sanitize::{ERROR_MARKER, FailureKind, ParseFailure, PayloadEntry, parse_response};
pub use timestamp::{normalize_timestamp, parse_timestamp};

/// Run the full extraction chain over one oracle response.
///
/// A payload whose entries all lack a building name is reported as
/// [`FailureKind::EmptyPayload`].
#[instrument(skip_all, fields(subject = %subject))]
pub fn extract(raw: &str, subject: &SubjectId) -> Result<Vec<InteractionRecord>, ParseFailure> {
    let entries = parse_response(raw)?;
    let normalized: Vec<_> = entries
        .iter()
        .map(|entry| normalize_entry(entry, subject))
        .collect();
    let records = merge_records(normalized);

    if records.is_empty() {
        return Err(ParseFailure::new(
            FailureKind::EmptyPayload,
            format!("{} entries, none naming a building", entries.len()),
            raw,
        ));
    }

    debug!(entries = entries.len(), records = records.len(), "extracted records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourledger_shared::TourStatus;

    #[test]
    fn two_partial_mentions_become_one_record() {
        let raw = r#"```json
[
  {"building_name": "Fulbrix", "sent_method": "Call", "timestamp": "2025-04-23T21:28:22+00:00"},
  {"building_name": "fulbrix", "status": "toured", "tour_type": "In-Person Tour"}
]
```"#;

        let records = extract(raw, &SubjectId::from(42)).expect("records");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.building_name, "fulbrix");
        assert_eq!(record.sent_method, "Call");
        assert_eq!(record.sent_at, "2025-04-23T21:28:22+00:00");
        assert_eq!(record.tour_status, TourStatus::Toured);
        assert!(record.tour_completed);
        assert_eq!(record.tour_type, "In-Person Tour");
    }

    #[test]
    fn oracle_error_passes_through() {
        let err = extract("Error: timeout", &SubjectId::from(7)).unwrap_err();
        assert_eq!(err.kind, FailureKind::OracleError);
        assert_eq!(err.raw, "Error: timeout");
    }

    #[test]
    fn entries_without_names_are_empty_payload() {
        let raw = r#"[{"notes": "client asked about parking"}]"#;
        let err = extract(raw, &SubjectId::from(7)).unwrap_err();
        assert_eq!(err.kind, FailureKind::EmptyPayload);
        assert_eq!(err.raw, raw);
    }
}
