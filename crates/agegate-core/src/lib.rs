//! Agegate core contracts
//!
//! Data model and collaborator interfaces for the age-verification consent
//! gate. This crate holds the leaf pieces the engine composes:
//!
//! - configuration snapshot and store contract ([`config`])
//! - per-visitor session store contract ([`session`])
//! - visitor role derivation ([`role`])
//! - the consent record and its legacy/structured normalization ([`consent`])
//! - the gate verdict vocabulary ([`verdict`])
//!
//! The engine itself lives in `agegate-guard`; everything here is
//! host-agnostic so the collaborators can be backed by a real CMS session
//! and configuration table in production, and by the in-memory fakes in
//! tests.

pub mod config;
pub mod consent;
pub mod role;
pub mod session;
pub mod verdict;

pub use config::*;
pub use consent::*;
pub use role::*;
pub use session::*;
pub use verdict::*;

use thiserror::Error;

/// Errors from gate operations.
///
/// Three classes, kept apart so callers can log security rejections at a
/// higher severity than plain bad input:
/// - `Validation`: malformed input to a validator
/// - `Security`: input rejected for a dangerous pattern
/// - `State`: a session/config collaborator failed or returned garbage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("security rejection: {0}")]
    Security(String),
    #[error("collaborator state error: {0}")]
    State(String),
}

impl GateError {
    /// Whether this error should be logged as a security event.
    pub fn is_security(&self) -> bool {
        matches!(self, GateError::Security(_))
    }
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
