//! Gate configuration - snapshot and store contract
//!
//! Four settings drive the gate: the enabled flag, the decline fallback
//! URL, the consent duration (minutes, 0 = session-only) and whether the
//! gate also applies to logged-in users. They live in an external
//! configuration store; the engine only ever sees an immutable
//! [`ConfigSnapshot`] taken at the start of a decision.
//!
//! A setting that has not been loaded yet is *unknown*, and unknown is not
//! the same as zero: collapsing the two would auto-trust consent the
//! operator never configured as session-only.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{GateError, Result};

/// Upper bound for the configured consent duration (30 days in minutes).
pub const MAX_CONSENT_DURATION_MINUTES: u32 = 43_200;

/// Fallback destination used when a decliner has no configured fallback and
/// no usable referer.
pub const DEFAULT_FALLBACK_URL: &str = "https://www.google.com";

/// Configuration parameter names.
pub const CONFIG_ENABLED: &str = "agegate_enabled";
pub const CONFIG_FALLBACK_URL: &str = "agegate_fallback_url";
pub const CONFIG_CONSENT_DURATION: &str = "agegate_consent_duration";
pub const CONFIG_APPLY_LOGGED_IN: &str = "agegate_apply_to_logged_in";

/// The configured consent duration.
///
/// `Unknown` means the configuration has not been loaded; it blocks every
/// auto-trust path (structured record, legacy flag, cookie reconstruction)
/// rather than silently behaving like session-only mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentDuration {
    /// Configuration not loaded; never treat as session-only.
    Unknown,
    /// Known value in minutes; 0 = session-only consent.
    Minutes(u32),
}

impl ConsentDuration {
    /// Known and explicitly session-only (duration 0).
    pub fn is_session_only(self) -> bool {
        self == ConsentDuration::Minutes(0)
    }

    /// The expiry window in seconds, when one applies.
    ///
    /// `None` for both `Unknown` and session-only mode; the caller must
    /// have already distinguished those two via [`Self::is_session_only`].
    pub fn window_secs(self) -> Option<i64> {
        match self {
            ConsentDuration::Minutes(m) if m > 0 => Some(i64::from(m) * 60),
            _ => None,
        }
    }
}

/// Read-only view of the gate settings for one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Whether the gate is active at all.
    pub enabled: bool,
    /// Destination for visitors who decline; empty = no override.
    pub fallback_url: String,
    /// Consent duration; see [`ConsentDuration`].
    pub duration: ConsentDuration,
    /// Whether logged-in non-admin users are gated too.
    pub apply_to_logged_in: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        // Matches the store defaults for absent keys: the gate is on unless
        // explicitly disabled, and the duration is unknown until loaded.
        Self {
            enabled: true,
            fallback_url: String::new(),
            duration: ConsentDuration::Unknown,
            apply_to_logged_in: false,
        }
    }
}

/// External configuration store contract.
///
/// Absence is reported as `Ok(None)`, not as a default value; the snapshot
/// logic owns the defaulting rules.
pub trait ConfigStore: Send + Sync {
    /// Read one parameter's raw value.
    fn get(&self, param: &str) -> Result<Option<String>>;

    /// Write one parameter.
    fn set(&self, param: &str, value: &str) -> Result<()>;

    /// Build an immutable snapshot of the four gate settings.
    fn snapshot(&self) -> Result<ConfigSnapshot> {
        let enabled = match self.get(CONFIG_ENABLED)? {
            Some(raw) => parse_bool(&raw),
            None => true,
        };
        let fallback_url = self.get(CONFIG_FALLBACK_URL)?.unwrap_or_default();
        let duration = match self.get(CONFIG_CONSENT_DURATION)? {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(m) if m <= MAX_CONSENT_DURATION_MINUTES => ConsentDuration::Minutes(m),
                _ => {
                    // Malformed stored value: stay conservative.
                    return Err(GateError::State(format!(
                        "unparseable consent duration in config store: {raw:?}"
                    )));
                }
            },
            None => ConsentDuration::Unknown,
        };
        let apply_to_logged_in = match self.get(CONFIG_APPLY_LOGGED_IN)? {
            Some(raw) => parse_bool(&raw),
            None => false,
        };
        Ok(ConfigSnapshot {
            enabled,
            fallback_url,
            duration,
            apply_to_logged_in,
        })
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim(), "1" | "true" | "on" | "yes")
}

/// In-memory configuration store.
///
/// Deterministic stand-in for the host's configuration table; also usable
/// as a process-local cache by embedders that load settings up front.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    params: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the four gate settings.
    pub fn with_settings(
        enabled: bool,
        fallback_url: &str,
        duration_minutes: u32,
        apply_to_logged_in: bool,
    ) -> Self {
        let store = Self::new();
        {
            let mut params = store.params.write();
            params.insert(CONFIG_ENABLED.into(), bool_str(enabled).into());
            params.insert(CONFIG_FALLBACK_URL.into(), fallback_url.into());
            params.insert(CONFIG_CONSENT_DURATION.into(), duration_minutes.to_string());
            params.insert(
                CONFIG_APPLY_LOGGED_IN.into(),
                bool_str(apply_to_logged_in).into(),
            );
        }
        store
    }
}

fn bool_str(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, param: &str) -> Result<Option<String>> {
        Ok(self.params.read().get(param).cloned())
    }

    fn set(&self, param: &str, value: &str) -> Result<()> {
        self.params.write().insert(param.into(), value.into());
        Ok(())
    }
}
