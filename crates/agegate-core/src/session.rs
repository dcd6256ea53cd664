//! Session store contract
//!
//! A per-visitor key-value map surviving across requests. The gate touches
//! four keys: the structured consent record, the legacy consent flag, the
//! saved redirect target and the last session-ID rotation time. The
//! contract is deliberately narrow so it can sit on top of whatever session
//! machinery the host CMS provides.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::consent::ConsentRecord;
use crate::Result;

/// Session key for the structured consent record.
pub const SESSION_CONSENT_KEY: &str = "agegate_consent";
/// Session key for the legacy boolean consent flag.
pub const SESSION_LEGACY_KEY: &str = "agegate_consent_granted";
/// Session key for the saved redirect target.
pub const SESSION_REDIRECT_KEY: &str = "agegate_redirect";
/// Session key for the last session-ID rotation timestamp.
pub const SESSION_ROTATED_KEY: &str = "agegate_session_rotated";

/// A value stored under a session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Record(ConsentRecord),
}

impl SessionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SessionValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SessionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&ConsentRecord> {
        match self {
            SessionValue::Record(r) => Some(r),
            _ => None,
        }
    }
}

/// Per-visitor session store contract.
///
/// One session is never driven by more than one decision at a time; if two
/// browser requests do race, last-write-wins on any key is acceptable.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<SessionValue>>;
    fn set(&self, key: &str, value: SessionValue) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Replace the session identifier, keeping the session data.
    ///
    /// Best-effort hardening against fixation; callers treat failure as
    /// non-fatal.
    fn rotate_id(&self) -> Result<()>;
}

/// In-memory session store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: RwLock<HashMap<String, SessionValue>>,
    rotations: RwLock<u32>,
    writes: RwLock<u32>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the session ID has been rotated.
    pub fn rotation_count(&self) -> u32 {
        *self.rotations.read()
    }

    /// How many `set` calls reached the store. Lets tests assert that
    /// redundant writes were suppressed upstream.
    pub fn write_count(&self) -> u32 {
        *self.writes.read()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<SessionValue>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: SessionValue) -> Result<()> {
        *self.writes.write() += 1;
        self.values.write().insert(key.into(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }

    fn rotate_id(&self) -> Result<()> {
        *self.rotations.write() += 1;
        Ok(())
    }
}
