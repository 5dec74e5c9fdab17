//! Consolidation of repeated mentions of one building.
//!
//! Records sharing an entity key collapse into one. Field by field the later
//! value wins unless it is still a default, in which case the earlier value
//! is kept. Output order is the order of first appearance.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use tourledger_shared::{InteractionRecord, NO_TIMESTAMP, TourStatus, UNKNOWN};

/// A value that may still hold its schema default.
trait Unset {
    fn is_unset(&self) -> bool;
}

impl Unset for String {
    fn is_unset(&self) -> bool {
        self.is_empty() || self == UNKNOWN || self == NO_TIMESTAMP
    }
}

impl Unset for bool {
    fn is_unset(&self) -> bool {
        !*self
    }
}

impl Unset for f64 {
    fn is_unset(&self) -> bool {
        *self == 0.0
    }
}

impl Unset for Vec<String> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl Unset for TourStatus {
    fn is_unset(&self) -> bool {
        *self == TourStatus::Unknown
    }
}

impl Unset for Value {
    fn is_unset(&self) -> bool {
        self.is_null()
    }
}

fn prefer<T: Unset>(earlier: T, later: T) -> T {
    if later.is_unset() { earlier } else { later }
}

/// Merge a later mention into an earlier one.
pub fn merge_pair(earlier: InteractionRecord, later: InteractionRecord) -> InteractionRecord {
    let mut extra = earlier.extra;
    for (key, value) in later.extra {
        let merged = match extra.remove(&key) {
            Some(previous) => prefer(previous, value),
            None => value,
        };
        extra.insert(key, merged);
    }

    InteractionRecord {
        schema_version: earlier.schema_version.max(later.schema_version),
        building_name: prefer(earlier.building_name, later.building_name),
        sent_at: prefer(earlier.sent_at, later.sent_at),
        sent_method: prefer(earlier.sent_method, later.sent_method),
        tour_status: prefer(earlier.tour_status, later.tour_status),
        tour_completed: prefer(earlier.tour_completed, later.tour_completed),
        tour_type: prefer(earlier.tour_type, later.tour_type),
        tour_scheduled_at: prefer(earlier.tour_scheduled_at, later.tour_scheduled_at),
        tour_booked_at: prefer(earlier.tour_booked_at, later.tour_booked_at),
        booking_method: prefer(earlier.booking_method, later.booking_method),
        actions: prefer(earlier.actions, later.actions),
        rejected: prefer(earlier.rejected, later.rejected),
        rejection_reason: prefer(earlier.rejection_reason, later.rejection_reason),
        replaced_by: prefer(earlier.replaced_by, later.replaced_by),
        notes: prefer(earlier.notes, later.notes),
        address: prefer(earlier.address, later.address),
        price: prefer(earlier.price, later.price),
        contact_name: prefer(earlier.contact_name, later.contact_name),
        contact_phone: prefer(earlier.contact_phone, later.contact_phone),
        contact_email: prefer(earlier.contact_email, later.contact_email),
        extra,
    }
}

/// Collapse records to one per entity key.
///
/// Records whose building name is still the default cannot be keyed and are
/// dropped.
pub fn merge_records(records: Vec<InteractionRecord>) -> Vec<InteractionRecord> {
    let incoming = records.len();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<InteractionRecord> = Vec::new();
    let mut unnamed = 0usize;

    for record in records {
        if record.building_name.is_unset() {
            unnamed += 1;
            continue;
        }
        let key = record.entity_key();
        match slots.get(&key) {
            Some(&index) => {
                let earlier = std::mem::take(&mut merged[index]);
                merged[index] = merge_pair(earlier, record);
            }
            None => {
                slots.insert(key, merged.len());
                merged.push(record);
            }
        }
    }

    debug!(incoming, merged = merged.len(), unnamed, "merged records");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> InteractionRecord {
        InteractionRecord {
            building_name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn later_partial_mention_does_not_erase_earlier_detail() {
        let first = InteractionRecord {
            sent_method: "Call".into(),
            ..named("The Parker")
        };
        let second = InteractionRecord {
            tour_status: TourStatus::Toured,
            ..named("The Parker")
        };

        let merged = merge_records(vec![first, second]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].sent_method, "Call");
        assert_eq!(merged[0].tour_status, TourStatus::Toured);
        assert_eq!(merged[0].entity_key(), "the parker");
    }

    #[test]
    fn later_non_default_value_wins() {
        let first = InteractionRecord {
            tour_status: TourStatus::Sent,
            notes: "asked about parking".into(),
            ..named("Coppia")
        };
        let second = InteractionRecord {
            tour_status: TourStatus::Cancelled,
            ..named("coppia ")
        };

        let merged = merge_pair(first, second);
        assert_eq!(merged.tour_status, TourStatus::Cancelled);
        assert_eq!(merged.notes, "asked about parking");
        assert_eq!(merged.building_name, "coppia ");
    }

    #[test]
    fn first_appearance_order_is_kept() {
        let merged = merge_records(vec![
            named("Fulbrix"),
            named("The Jax"),
            InteractionRecord {
                price: 2850.0,
                ..named("FULBRIX")
            },
            named("Lake & Wells"),
        ]);

        let keys: Vec<_> = merged.iter().map(InteractionRecord::entity_key).collect();
        assert_eq!(keys, vec!["fulbrix", "the jax", "lake & wells"]);
        assert_eq!(merged[0].price, 2850.0);
    }

    #[test]
    fn unnamed_records_are_dropped() {
        let merged = merge_records(vec![InteractionRecord::default(), named("Fulbrix")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].building_name, "Fulbrix");
    }

    #[test]
    fn extra_fields_merge_by_key() {
        let mut first = named("The Parker");
        first.extra.insert("floor_plan".into(), "1BR".into());
        first.extra.insert("parking".into(), "garage".into());
        let mut second = named("The Parker");
        second.extra.insert("floor_plan".into(), "2BR".into());
        second.extra.insert("pets".into(), Value::Null);

        let merged = merge_pair(first, second);
        assert_eq!(merged.extra["floor_plan"], "2BR");
        assert_eq!(merged.extra["parking"], "garage");
        assert!(merged.extra["pets"].is_null());
    }

    #[test]
    fn empty_input() {
        assert!(merge_records(Vec::new()).is_empty());
    }
}
