//! Payload entry → fully populated [`InteractionRecord`].
//!
//! Field names are matched loosely (case, spaces, hyphens, a few aliases).
//! Values the oracle marks as absent ("Not mentioned", "N/A", null, ...)
//! leave the field at its default. Nothing here can fail.

use serde_json::Value;
use tracing::debug;

use tourledger_shared::{InteractionRecord, SubjectId, TourStatus};

use crate::sanitize::PayloadEntry;
use crate::timestamp::normalize_timestamp;

/// Text the oracle uses to say "no value".
const PLACEHOLDERS: &[&str] = &["", "none", "null", "n/a", "na", "unknown", "not mentioned", "-"];

/// Map a raw field name onto its canonical schema name.
fn canonical_field(raw: &str) -> String {
    let key: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();

    match key.as_str() {
        "status" => "tour_status".into(),
        "timestamp" => "sent_at".into(),
        "building" | "name" => "building_name".into(),
        "rent" => "price".into(),
        "tour_date" => "tour_scheduled_at".into(),
        _ => key,
    }
}

/// Build a record from one payload entry.
pub fn normalize_entry(entry: &PayloadEntry, subject: &SubjectId) -> InteractionRecord {
    let mut record = InteractionRecord::default();

    for (raw_key, value) in entry {
        let field = canonical_field(raw_key);
        match field.as_str() {
            "building_name" => set_text(&mut record.building_name, value),
            "sent_method" => set_text(&mut record.sent_method, value),
            "tour_type" => set_text(&mut record.tour_type, value),
            "booking_method" => set_text(&mut record.booking_method, value),
            "rejection_reason" => set_text(&mut record.rejection_reason, value),
            "replaced_by" => set_text(&mut record.replaced_by, value),
            "notes" => set_text(&mut record.notes, value),
            "address" => set_text(&mut record.address, value),
            "contact_name" => set_text(&mut record.contact_name, value),
            "contact_phone" => set_text(&mut record.contact_phone, value),
            "contact_email" => set_text(&mut record.contact_email, value),
            "sent_at" => set_timestamp(&mut record.sent_at, value),
            "tour_scheduled_at" => set_timestamp(&mut record.tour_scheduled_at, value),
            "tour_booked_at" => set_timestamp(&mut record.tour_booked_at, value),
            "tour_status" => {
                if let Some(text) = as_text(value) {
                    record.tour_status = TourStatus::from_loose(&text);
                }
            }
            "tour_completed" => record.tour_completed = as_bool(value),
            "rejected" => record.rejected = as_bool(value),
            "actions" => record.actions = as_list(value),
            "price" => record.price = as_price(value).unwrap_or(0.0),
            "schema_version" => {}
            _ => {
                if !value.is_null() {
                    record.extra.insert(raw_key.clone(), value.clone());
                }
            }
        }
    }

    match record.tour_status {
        TourStatus::Toured => record.tour_completed = true,
        TourStatus::Rejected => record.rejected = true,
        _ => {}
    }

    debug!(
        subject = %subject,
        building = %record.building_name,
        status = %record.tour_status,
        extra_fields = record.extra.len(),
        "normalized payload entry"
    );

    record
}

fn set_text(slot: &mut String, value: &Value) {
    if let Some(text) = as_text(value) {
        *slot = text;
    }
}

fn set_timestamp(slot: &mut String, value: &Value) {
    *slot = normalize_timestamp(&as_text(value).unwrap_or_default());
}

fn is_placeholder(text: &str) -> bool {
    let lower = text.trim().to_ascii_lowercase();
    PLACEHOLDERS.contains(&lower.as_str())
}

/// Scalar → trimmed text, or `None` when absent.
fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(as_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => return None,
    };
    (!is_placeholder(&text)).then_some(text)
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1"
        ),
        _ => false,
    }
}

fn as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !is_placeholder(part))
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// Numbers, or text such as `"$3,300"`, `"3.3k"`, `"2300/mo"`.
fn as_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let lower = s.trim().to_ascii_lowercase();
            let start = lower.find(|c: char| c.is_ascii_digit())?;
            let tail = &lower[start..];
            let end = tail
                .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
                .unwrap_or(tail.len());
            let amount: f64 = tail[..end].replace(',', "").parse().ok()?;
            let thousands = tail[end..].trim_start().starts_with('k');
            Some(if thousands { amount * 1000.0 } else { amount })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tourledger_shared::{NO_TIMESTAMP, UNKNOWN};

    fn entry(value: Value) -> PayloadEntry {
        match value {
            Value::Object(map) => map,
            _ => panic!("test entry must be an object"),
        }
    }

    fn subject() -> SubjectId {
        SubjectId::from(42)
    }

    #[test]
    fn empty_entry_is_all_defaults() {
        let record = normalize_entry(&PayloadEntry::new(), &subject());
        assert_eq!(record, InteractionRecord::default());
    }

    #[test]
    fn original_agent_schema_maps_onto_canonical_fields() {
        let record = normalize_entry(
            &entry(json!({
                "building_name": "The Parker",
                "tour_time": "10:00 AM",
                "status": "toured",
                "actions": ["Guest Card", "Call"],
                "booking_method": "Call",
                "tour_type": "In-Person Tour",
                "notes": null,
                "timestamp": "2025-04-23T21:28:22.000+00:00"
            })),
            &subject(),
        );

        assert_eq!(record.building_name, "The Parker");
        assert_eq!(record.tour_status, TourStatus::Toured);
        assert!(record.tour_completed);
        assert_eq!(record.actions, vec!["Guest Card", "Call"]);
        assert_eq!(record.booking_method, "Call");
        assert_eq!(record.notes, UNKNOWN);
        assert_eq!(record.sent_at, "2025-04-23T21:28:22+00:00");
        assert_eq!(record.extra["tour_time"], "10:00 AM");
    }

    #[test]
    fn placeholders_keep_defaults() {
        let record = normalize_entry(
            &entry(json!({
                "Building Name": "Coppia",
                "sent_method": "Not mentioned",
                "address": "N/A",
                "tour_scheduled_at": "",
                "rejection_reason": "  none "
            })),
            &subject(),
        );
        assert_eq!(record.building_name, "Coppia");
        assert_eq!(record.sent_method, UNKNOWN);
        assert_eq!(record.address, UNKNOWN);
        assert_eq!(record.tour_scheduled_at, NO_TIMESTAMP);
        assert_eq!(record.rejection_reason, UNKNOWN);
    }

    #[test]
    fn timestamps_pass_through_the_normalizer() {
        let record = normalize_entry(
            &entry(json!({
                "sent_at": "2025-04-23T00:00:00+00:00",
                "tour_scheduled_at": "2025-04-26 10:00",
                "tour_booked_at": "garbage"
            })),
            &subject(),
        );
        assert_eq!(record.sent_at, NO_TIMESTAMP);
        assert_eq!(record.tour_scheduled_at, "2025-04-26T10:00:00+00:00");
        assert_eq!(record.tour_booked_at, NO_TIMESTAMP);
    }

    #[test]
    fn rejected_status_sets_flag() {
        let record = normalize_entry(
            &entry(json!({
                "building_name": "Lake & Wells",
                "status": "Rejected",
                "rejection_reason": "toured a year ago, prefers not to live in the loop"
            })),
            &subject(),
        );
        assert!(record.rejected);
        assert!(!record.tour_completed);
    }

    #[test]
    fn loose_scalar_types() {
        let record = normalize_entry(
            &entry(json!({
                "tour_completed": "yes",
                "price": "$3,300/mo",
                "actions": "Call, Email, not mentioned"
            })),
            &subject(),
        );
        assert!(record.tour_completed);
        assert_eq!(record.price, 3300.0);
        assert_eq!(record.actions, vec!["Call", "Email"]);
    }

    #[test]
    fn price_shorthand() {
        assert_eq!(as_price(&json!("3.3k")), Some(3300.0));
        assert_eq!(as_price(&json!(2300)), Some(2300.0));
        assert_eq!(as_price(&json!("call for pricing")), None);
    }

    #[test]
    fn unknown_non_null_fields_go_to_extra() {
        let record = normalize_entry(
            &entry(json!({
                "building_name": "The Jax",
                "year_built": 2022,
                "amenities": ["rooftop terrace", "fitness center"],
                "parking": null
            })),
            &subject(),
        );
        assert_eq!(record.extra["year_built"], 2022);
        assert_eq!(record.extra.len(), 2);
        assert!(!record.extra.contains_key("parking"));
    }
}
