//! Session-backed consent persistence
//!
//! Owns the four gate session keys. All reads go through the per-request
//! [`SessionCache`]; all writes keep the structured record and the legacy
//! flag consistent with each other.

use tracing::{debug, warn};

use agegate_core::{
    ConsentDuration, ConsentRecord, ConsentState, Result, SessionStore, SessionValue,
    SESSION_CONSENT_KEY, SESSION_LEGACY_KEY, SESSION_ROTATED_KEY,
};

use crate::session_cache::SessionCache;

/// Minimum interval between session-ID rotations (seconds).
pub const SESSION_ROTATION_INTERVAL_SECS: i64 = 300;

/// Consent state reader/writer over one visitor's session.
pub struct ConsentStore<'a> {
    cache: SessionCache<'a>,
}

impl<'a> ConsentStore<'a> {
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self {
            cache: SessionCache::new(store),
        }
    }

    /// Canonical consent state for this session.
    pub fn state(&mut self) -> Result<ConsentState> {
        let structured = self.cache.get(SESSION_CONSENT_KEY)?;
        let legacy = self.cache.get(SESSION_LEGACY_KEY)?;
        Ok(ConsentState::normalize(
            structured.as_ref(),
            legacy.as_ref(),
        ))
    }

    /// Record granted consent, keeping both representations in step so
    /// older code paths reading the legacy flag stay coherent.
    pub fn record_consent(&mut self, timestamp_secs: i64) -> Result<()> {
        self.cache.set(
            SESSION_CONSENT_KEY,
            SessionValue::Record(ConsentRecord::granted_at(timestamp_secs)),
        )?;
        self.cache.set(SESSION_LEGACY_KEY, SessionValue::Bool(true))?;
        Ok(())
    }

    /// Drop both consent representations, e.g. after expiry.
    pub fn clear_consent(&mut self) -> Result<()> {
        self.cache.remove(SESSION_CONSENT_KEY)?;
        self.cache.remove(SESSION_LEGACY_KEY)?;
        Ok(())
    }

    /// Upgrade a legacy-flag-only session to the structured record,
    /// stamped with the current time. One-shot: the next request sees a
    /// structured record and never takes the legacy path again.
    pub fn migrate_legacy(&mut self, now_secs: i64) -> Result<()> {
        debug!("migrating legacy consent flag to structured record");
        self.cache.set(
            SESSION_CONSENT_KEY,
            SessionValue::Record(ConsentRecord::granted_at(now_secs)),
        )?;
        Ok(())
    }

    /// Whether the stored consent has outlived the configured duration.
    ///
    /// A legacy-only flag never expires here (it carries no timestamp), and
    /// neither does a record stamped 0 or any record under a session-only
    /// or unknown duration. A missing record counts as expired.
    pub fn is_expired(&mut self, duration: ConsentDuration, now_secs: i64) -> Result<bool> {
        let state = self.state()?;
        Ok(match state {
            ConsentState::Absent => true,
            ConsentState::LegacyOnly => false,
            ConsentState::Structured(record) => {
                if record.timestamp_secs == 0 {
                    false
                } else {
                    match duration.window_secs() {
                        Some(window) => record.age_secs(now_secs) >= window,
                        None => false,
                    }
                }
            }
        })
    }

    /// Rotate the session ID if the last rotation is old enough.
    ///
    /// Rotation failure is logged and swallowed; fixation hardening must
    /// never turn into a denial for a visitor holding valid consent.
    pub fn rotate_if_due(&mut self, now_secs: i64) -> Result<bool> {
        let last = self
            .cache
            .get(SESSION_ROTATED_KEY)?
            .as_ref()
            .and_then(SessionValue::as_int);
        if let Some(last) = last {
            if now_secs - last < SESSION_ROTATION_INTERVAL_SECS {
                return Ok(false);
            }
        }
        self.force_rotate(now_secs)?;
        Ok(true)
    }

    /// Rotate the session ID unconditionally and stamp the rotation time.
    pub fn force_rotate(&mut self, now_secs: i64) -> Result<()> {
        if let Err(err) = self.cache.store().rotate_id() {
            warn!(%err, "session ID rotation failed; continuing");
        }
        self.cache
            .set(SESSION_ROTATED_KEY, SessionValue::Int(now_secs))?;
        Ok(())
    }
}
