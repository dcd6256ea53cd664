//! Gate verdict vocabulary
//!
//! Every gating decision resolves to a typed verdict with a
//! machine-readable reason. Nothing on this path ever raises to the
//! caller; internal faults surface as a `Redirect` with a fail-closed
//! reason.

use serde::{Deserialize, Serialize};

/// Why a request was allowed through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllowReason {
    /// The gate is switched off.
    GateDisabled,
    /// Admin/webmaster bypass, unconditional.
    AdminBypass,
    /// Logged-in user and the gate is configured for guests only.
    LoggedInBypass,
    /// Valid structured consent within the configured duration.
    ValidConsent,
    /// Legacy flag honoured in session-only mode (and upgraded).
    LegacyConsent,
    /// Consent rebuilt from the persistence token.
    ReconstructedConsent,
    /// The request already targets the consent page (loop guard).
    OnConsentPage,
}

/// Why a request was redirected to the consent page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedirectReason {
    /// No consent of any kind was found.
    NoConsent,
    /// A structured record existed but its duration window has passed.
    ConsentExpired,
    /// A collaborator failed mid-decision; deny by default.
    FailClosed,
}

/// The outcome of one gating decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Allow(AllowReason),
    Redirect {
        /// Consent-page location, including any preserved-destination
        /// query parameter.
        location: String,
        reason: RedirectReason,
    },
}

impl Verdict {
    /// Whether the request may proceed to content.
    pub fn allows(&self) -> bool {
        matches!(self, Verdict::Allow(_))
    }

    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            Verdict::Redirect { location, .. } => Some(location),
            Verdict::Allow(_) => None,
        }
    }
}
