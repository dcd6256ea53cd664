//! Consent record and legacy normalization
//!
//! Two representations of consent coexist in old sessions: the structured
//! `{granted, timestamp}` record and a bare legacy boolean from an earlier
//! release. The rest of the system never reasons about that mix directly;
//! [`ConsentState::normalize`] is the single place where the raw session
//! values collapse into one canonical state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionValue;

/// Structured consent as stored in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub granted: bool,
    /// Unix timestamp (seconds) of when consent was given. A value of 0
    /// means "no timestamp recorded" and never expires.
    pub timestamp_secs: i64,
}

impl ConsentRecord {
    pub fn granted_at(timestamp_secs: i64) -> Self {
        Self {
            granted: true,
            timestamp_secs,
        }
    }

    /// Age of the record relative to `now`, clamped at zero for records
    /// stamped in the future (clock skew).
    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.timestamp_secs).max(0)
    }

    /// The grant time as a UTC datetime, for display and audit output.
    /// `None` when the timestamp is out of chrono's representable range.
    pub fn granted_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp_secs, 0)
    }
}

/// Canonical view of the session's consent, after normalizing the mixed
/// legacy/structured representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentState {
    /// No consent of any kind.
    Absent,
    /// Only the legacy boolean flag is present. Trusted solely in
    /// session-only mode (duration == 0).
    LegacyOnly,
    /// A structured record with `granted = true`.
    Structured(ConsentRecord),
}

impl ConsentState {
    /// Collapse the two raw session values into one canonical state.
    ///
    /// A structured record wins over the legacy flag; a record with
    /// `granted = false` (or a value of the wrong shape) is ignored.
    pub fn normalize(structured: Option<&SessionValue>, legacy: Option<&SessionValue>) -> Self {
        if let Some(record) = structured.and_then(SessionValue::as_record) {
            if record.granted {
                return ConsentState::Structured(*record);
            }
        }
        if legacy.and_then(SessionValue::as_bool) == Some(true) {
            return ConsentState::LegacyOnly;
        }
        ConsentState::Absent
    }

    pub fn record(&self) -> Option<&ConsentRecord> {
        match self {
            ConsentState::Structured(r) => Some(r),
            _ => None,
        }
    }
}
