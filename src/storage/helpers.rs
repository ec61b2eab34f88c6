//! Shared storage helper functions.
//!
//! Column encodings used by every SQL backend: ids are hyphenated UUID text,
//! timestamps are fixed-width RFC3339 UTC with microseconds so that text
//! ordering equals time ordering.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::{Result, StorageError};

/// Format a timestamp for storage.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

/// Parse a stored UUID.
pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(raw)?)
}

/// Current time truncated to storage precision, so values read back compare
/// equal to the values written.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}
