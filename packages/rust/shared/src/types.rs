//! Core domain types: subjects, messages, and interaction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TourLedgerError;

/// Current schema version for persisted interaction records.
pub const RECORD_SCHEMA_VERSION: u32 = 2;

/// Default for text fields the oracle did not supply.
pub const UNKNOWN: &str = "unknown";

/// Default for timestamp fields with no reliable value.
pub const NO_TIMESTAMP: &str = "none";

// ---------------------------------------------------------------------------
// SubjectId
// ---------------------------------------------------------------------------

/// Identifier of a client whose conversation history is analyzed.
///
/// Owned by the message source; the core never mints these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SubjectId {
    type Err = TourLedgerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TourLedgerError::validation("subject id must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// A subject selected for processing, with the time it qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRef {
    pub id: SubjectId,
    pub qualified_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One timestamped unit of conversation belonging to a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// When the message was sent, if the source recorded it.
    pub sent_at: Option<DateTime<Utc>>,
    /// Message text exactly as stored.
    pub body: String,
}

impl Message {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            sent_at: None,
            body: body.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TourStatus
// ---------------------------------------------------------------------------

/// Engagement status of one building for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourStatus {
    Sent,
    Scheduled,
    Toured,
    Rejected,
    Cancelled,
    Replaced,
    #[default]
    Unknown,
}

impl TourStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Scheduled => "scheduled",
            Self::Toured => "toured",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Replaced => "replaced",
            Self::Unknown => "unknown",
        }
    }

    /// Read a status from free text, accepting the spellings the oracle uses.
    pub fn from_loose(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "sent" | "shared" | "recommended" => Self::Sent,
            "scheduled" | "booked" | "tour scheduled" => Self::Scheduled,
            "toured" | "visited" | "completed" | "tour completed" => Self::Toured,
            "rejected" | "declined" => Self::Rejected,
            "cancelled" | "canceled" => Self::Cancelled,
            "replaced" => Self::Replaced,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for TourStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// InteractionRecord
// ---------------------------------------------------------------------------

/// One building-level interaction inferred from a client's transcript.
///
/// Every field carries a default so a record is always fully populated,
/// whatever the oracle omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionRecord {
    pub schema_version: u32,
    pub building_name: String,
    pub sent_at: String,
    pub sent_method: String,
    pub tour_status: TourStatus,
    pub tour_completed: bool,
    pub tour_type: String,
    pub tour_scheduled_at: String,
    pub tour_booked_at: String,
    pub booking_method: String,
    pub actions: Vec<String>,
    pub rejected: bool,
    pub rejection_reason: String,
    pub replaced_by: String,
    pub notes: String,
    pub address: String,
    pub price: f64,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    /// Fields outside the canonical schema, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for InteractionRecord {
    fn default() -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            building_name: UNKNOWN.into(),
            sent_at: NO_TIMESTAMP.into(),
            sent_method: UNKNOWN.into(),
            tour_status: TourStatus::Unknown,
            tour_completed: false,
            tour_type: UNKNOWN.into(),
            tour_scheduled_at: NO_TIMESTAMP.into(),
            tour_booked_at: NO_TIMESTAMP.into(),
            booking_method: UNKNOWN.into(),
            actions: Vec::new(),
            rejected: false,
            rejection_reason: UNKNOWN.into(),
            replaced_by: UNKNOWN.into(),
            notes: UNKNOWN.into(),
            address: UNKNOWN.into(),
            price: 0.0,
            contact_name: UNKNOWN.into(),
            contact_phone: UNKNOWN.into(),
            contact_email: UNKNOWN.into(),
            extra: serde_json::Map::new(),
        }
    }
}

impl InteractionRecord {
    /// Case- and whitespace-insensitive key identifying the building.
    pub fn entity_key(&self) -> String {
        entity_key(&self.building_name)
    }
}

/// Normalize a building name into its merge key.
pub fn entity_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
