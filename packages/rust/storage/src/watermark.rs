//! Durable batch cursor.
//!
//! A single text file holding one RFC 3339 timestamp. Read at batch start,
//! replaced atomically at batch end. The stored value never moves backwards.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tourledger_shared::{Result, TourLedgerError};

use crate::artifacts::write_atomic;

/// Cursor used when nothing usable is stored: process everything.
pub fn backfill_cursor() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored cursor, `Ok(None)` when none has been written yet.
    ///
    /// A file that does not hold a timestamp is a parse error.
    pub fn stored(&self) -> Result<Option<DateTime<Utc>>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TourLedgerError::io(&self.path, e)),
        };
        DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                TourLedgerError::parse(format!("watermark {}: {e}", self.path.display()))
            })
    }

    /// Cursor for the next batch. Missing or corrupt state falls back to a
    /// full backfill.
    pub fn load(&self) -> DateTime<Utc> {
        match self.stored() {
            Ok(Some(at)) => {
                debug!(watermark = %at.to_rfc3339(), "loaded watermark");
                at
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no watermark stored, full backfill");
                backfill_cursor()
            }
            Err(e) => {
                warn!(error = %e, "watermark unreadable, falling back to full backfill");
                backfill_cursor()
            }
        }
    }

    /// Persist `max(now, previous)` and return it.
    pub fn advance(&self, previous: DateTime<Utc>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let next = if now < previous {
            warn!(
                previous = %previous.to_rfc3339(),
                now = %now.to_rfc3339(),
                "clock is behind the stored watermark, keeping previous value"
            );
            previous
        } else {
            now
        };
        write_atomic(&self.path, &format!("{}\n", next.to_rfc3339()))?;
        debug!(watermark = %next.to_rfc3339(), "stored watermark");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn temp_store() -> WatermarkStore {
        WatermarkStore::new(
            std::env::temp_dir()
                .join(format!("tl-watermark-{}", Uuid::now_v7()))
                .join("last_sync.txt"),
        )
    }

    #[test]
    fn missing_file_means_backfill() {
        let store = temp_store();
        assert_eq!(store.stored().unwrap(), None);
        assert_eq!(store.load(), backfill_cursor());
    }

    #[test]
    fn corrupt_file_means_backfill() {
        let store = temp_store();
        write_atomic(store.path(), "not a timestamp").unwrap();
        assert!(store.stored().is_err());
        assert_eq!(store.load(), backfill_cursor());
    }

    #[test]
    fn advance_then_load() {
        let store = temp_store();
        let now = Utc.with_ymd_and_hms(2025, 4, 23, 21, 28, 22).unwrap();
        let stored = store.advance(backfill_cursor(), now).unwrap();
        assert_eq!(stored, now);
        assert_eq!(store.load(), now);
    }

    #[test]
    fn never_moves_backwards() {
        let store = temp_store();
        let previous = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let skewed = previous - Duration::hours(3);

        let stored = store.advance(previous, skewed).unwrap();
        assert_eq!(stored, previous);
        assert_eq!(store.load(), previous);
    }
}
