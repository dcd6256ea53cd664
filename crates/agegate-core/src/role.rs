//! Visitor role derivation
//!
//! The identity provider hands over three facts about the current visitor;
//! the gate reduces them to one of three roles. Admins (including the
//! "webmaster" status some hosts use) always bypass the gate; guests are
//! always subject to it; logged-in users sit in between, controlled by the
//! apply-to-logged-in setting.

use serde::{Deserialize, Serialize};

/// Facts supplied by the host's identity provider for the current visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    pub is_guest: bool,
    pub is_admin: bool,
    /// Host-specific status string, e.g. "guest", "normal", "admin",
    /// "webmaster". Optional; the boolean flags win when it is absent.
    pub status: Option<String>,
}

impl VisitorIdentity {
    pub fn guest() -> Self {
        Self {
            is_guest: true,
            ..Self::default()
        }
    }

    pub fn logged_in() -> Self {
        Self {
            status: Some("normal".into()),
            ..Self::default()
        }
    }

    pub fn admin() -> Self {
        Self {
            is_admin: true,
            status: Some("admin".into()),
            ..Self::default()
        }
    }
}

/// The gate-relevant role of the current visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    LoggedInUser,
    Guest,
}

impl Role {
    /// Derive the role from identity facts.
    ///
    /// A missing identity is treated as a guest: when the host cannot say
    /// who the visitor is, the gate applies.
    pub fn derive(identity: Option<&VisitorIdentity>) -> Role {
        let Some(identity) = identity else {
            return Role::Guest;
        };
        let status = identity
            .status
            .as_deref()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if identity.is_admin || status == "admin" || status == "webmaster" {
            return Role::Admin;
        }
        if identity.is_guest || status == "guest" {
            return Role::Guest;
        }
        Role::LoggedInUser
    }
}
