//! Persistence token and cookie reconciliation
//!
//! Consent outlives the session through a small client-side cookie holding
//! nothing but the grant timestamp. When a returning visitor arrives with
//! the token but a fresh session, the reconciler rebuilds the structured
//! record, preserving the original grant time so the configured duration
//! keeps counting from the real grant, not from the revisit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use agegate_core::{ConsentDuration, Result};

use crate::consent_store::ConsentStore;

/// Name of the client-side persistence cookie.
pub const CONSENT_COOKIE_NAME: &str = "agc";

/// Hard cap on how old a persistence token may be before it is ignored,
/// regardless of the configured duration (24 hours).
pub const COOKIE_HARD_CAP_SECS: i64 = 86_400;

/// Parsed persistence token: the grant timestamp the client handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceToken {
    pub granted_secs: i64,
}

impl PersistenceToken {
    /// Parse the raw cookie value.
    ///
    /// Anything but a plain run of ASCII digits is rejected; the token is
    /// attacker-controlled and nothing downstream should see a partial
    /// parse of it.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse::<i64>()
            .ok()
            .map(|granted_secs| Self { granted_secs })
    }

    pub fn age_secs(&self, now_secs: i64) -> i64 {
        (now_secs - self.granted_secs).max(0)
    }
}

/// A `Set-Cookie` payload for the persistence cookie.
///
/// Host-only (no `Domain` attribute), `HttpOnly`, `SameSite=Lax`, and
/// `Secure` whenever the request itself arrived over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentCookie {
    pub value: String,
    pub max_age_secs: i64,
    pub secure: bool,
}

impl ConsentCookie {
    /// Cookie carrying the given grant timestamp.
    pub fn granted_at(timestamp_secs: i64, secure: bool) -> Self {
        Self {
            value: timestamp_secs.to_string(),
            max_age_secs: COOKIE_HARD_CAP_SECS,
            secure,
        }
    }

    /// Render the full `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        let mut header = format!(
            "{CONSENT_COOKIE_NAME}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            self.value, self.max_age_secs
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

/// Rebuilds session consent from a returning visitor's persistence token.
#[derive(Debug, Clone, Copy)]
pub struct CookieReconciler {
    hard_cap_secs: i64,
}

impl Default for CookieReconciler {
    fn default() -> Self {
        Self {
            hard_cap_secs: COOKIE_HARD_CAP_SECS,
        }
    }
}

impl CookieReconciler {
    /// Try to rebuild the structured record from a raw cookie value.
    ///
    /// Succeeds only when the token parses, the configured duration is
    /// known, the token is under the hard cap, and it also fits the
    /// configured window (session-only mode only enforces the cap). The
    /// rebuilt record keeps the token's original timestamp, and the
    /// session ID is rotated on success, rate-limited and best-effort.
    pub fn reconstruct(
        &self,
        consent: &mut ConsentStore<'_>,
        duration: ConsentDuration,
        raw_token: &str,
        now_secs: i64,
    ) -> Result<bool> {
        let Some(token) = PersistenceToken::parse(raw_token) else {
            return Ok(false);
        };
        // An unloaded duration must not silently behave like session-only.
        if duration == ConsentDuration::Unknown {
            return Ok(false);
        }
        let age = token.age_secs(now_secs);
        if age >= self.hard_cap_secs {
            return Ok(false);
        }
        if let Some(window) = duration.window_secs() {
            if age >= window {
                return Ok(false);
            }
        }
        debug!(age_secs = age, "reconstructing consent from token");
        consent.record_consent(token.granted_secs)?;
        consent.rotate_if_due(now_secs)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agegate_core::{ConsentRecord, ConsentState, MemorySessionStore};

    #[test]
    fn token_parsing_is_digits_only() {
        assert_eq!(
            PersistenceToken::parse("1700000000"),
            Some(PersistenceToken {
                granted_secs: 1_700_000_000
            })
        );
        assert_eq!(PersistenceToken::parse(""), None);
        assert_eq!(PersistenceToken::parse("-5"), None);
        assert_eq!(PersistenceToken::parse("17e3"), None);
        assert_eq!(PersistenceToken::parse("170000000 "), None);
        // Larger than i64.
        assert_eq!(PersistenceToken::parse("99999999999999999999"), None);
    }

    #[test]
    fn cookie_header_shape() {
        let cookie = ConsentCookie::granted_at(1_700_000_000, true);
        assert_eq!(
            cookie.to_set_cookie(),
            "agc=1700000000; Max-Age=86400; Path=/; HttpOnly; SameSite=Lax; Secure"
        );
        let plain = ConsentCookie::granted_at(1_700_000_000, false);
        assert!(!plain.to_set_cookie().contains("Secure"));
        assert!(!plain.to_set_cookie().contains("Domain"));
    }

    #[test]
    fn reconstruction_preserves_original_timestamp() {
        let store = MemorySessionStore::new();
        let mut consent = ConsentStore::new(&store);
        let reconciler = CookieReconciler::default();
        let granted = 1_700_000_000;
        let now = granted + 100;
        assert!(reconciler
            .reconstruct(&mut consent, ConsentDuration::Minutes(0), "1700000000", now)
            .unwrap());
        assert_eq!(
            consent.state().unwrap(),
            ConsentState::Structured(ConsentRecord::granted_at(granted))
        );
        assert_eq!(store.rotation_count(), 1);
    }

    #[test]
    fn hard_cap_applies_even_in_session_only_mode() {
        let store = MemorySessionStore::new();
        let mut consent = ConsentStore::new(&store);
        let reconciler = CookieReconciler::default();
        let granted = 1_700_000_000;
        let now = granted + COOKIE_HARD_CAP_SECS;
        assert!(!reconciler
            .reconstruct(&mut consent, ConsentDuration::Minutes(0), "1700000000", now)
            .unwrap());
        assert_eq!(consent.state().unwrap(), ConsentState::Absent);
    }

    #[test]
    fn configured_window_narrows_the_cap() {
        let store = MemorySessionStore::new();
        let mut consent = ConsentStore::new(&store);
        let reconciler = CookieReconciler::default();
        let granted = 1_700_000_000;
        // 1-minute duration: a 100-second-old token is too old even though
        // it is well under the hard cap.
        assert!(!reconciler
            .reconstruct(
                &mut consent,
                ConsentDuration::Minutes(1),
                "1700000000",
                granted + 100
            )
            .unwrap());
        assert!(reconciler
            .reconstruct(
                &mut consent,
                ConsentDuration::Minutes(1),
                "1700000000",
                granted + 59
            )
            .unwrap());
    }

    #[test]
    fn unknown_duration_blocks_reconstruction() {
        let store = MemorySessionStore::new();
        let mut consent = ConsentStore::new(&store);
        let reconciler = CookieReconciler::default();
        assert!(!reconciler
            .reconstruct(
                &mut consent,
                ConsentDuration::Unknown,
                "1700000000",
                1_700_000_010
            )
            .unwrap());
    }
}
