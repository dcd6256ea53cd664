//! Admin settings validation and persistence
//!
//! The settings form is validated as a whole: every field is checked and
//! every problem reported in one pass, and nothing is persisted unless the
//! whole form is clean. A half-saved configuration is worse than a
//! rejected one.

use serde::{Deserialize, Serialize};
use tracing::info;

use agegate_core::{
    ConfigStore, Result, CONFIG_APPLY_LOGGED_IN, CONFIG_CONSENT_DURATION, CONFIG_ENABLED,
    CONFIG_FALLBACK_URL, MAX_CONSENT_DURATION_MINUTES,
};

use crate::sanitize::{RejectReason, UrlSanitizer};

/// The raw admin form, fields as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsForm {
    pub enabled: bool,
    pub apply_to_logged_in: bool,
    pub fallback_url: String,
    /// Duration in minutes, as typed. Blank means session-only.
    pub duration: String,
}

/// One problem with the submitted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsError {
    /// The fallback URL failed sanitization.
    FallbackRejected(RejectReason),
    /// The fallback URL points back at this site or a private address.
    FallbackInternal,
    /// The duration is not a whole number.
    DurationNotInteger,
    /// The duration exceeds [`MAX_CONSENT_DURATION_MINUTES`].
    DurationOutOfRange,
}

impl SettingsError {
    pub fn description(self) -> &'static str {
        match self {
            SettingsError::FallbackRejected(reason) => reason.description(),
            SettingsError::FallbackInternal => {
                "fallback URL must point away from this site"
            }
            SettingsError::DurationNotInteger => "duration must be a whole number of minutes",
            SettingsError::DurationOutOfRange => "duration exceeds the 30-day maximum",
        }
    }
}

/// A form that passed validation, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedSettings {
    pub enabled: bool,
    pub apply_to_logged_in: bool,
    /// Empty when no fallback override is configured.
    pub fallback_url: String,
    pub duration_minutes: u32,
}

impl ValidatedSettings {
    /// Validate a submitted form, reporting every field error at once.
    ///
    /// `current_host` feeds the fallback URL's self-reference check; a
    /// fallback pointing back at the gated site would trap decliners in a
    /// loop.
    pub fn from_form(
        form: &SettingsForm,
        current_host: &str,
    ) -> std::result::Result<Self, Vec<SettingsError>> {
        let mut errors = Vec::new();

        let fallback_url = match UrlSanitizer::default().sanitize(&form.fallback_url, true, current_host)
        {
            Ok(accepted) => accepted.unwrap_or_default(),
            Err(RejectReason::InternalHost) => {
                errors.push(SettingsError::FallbackInternal);
                String::new()
            }
            Err(reason) => {
                errors.push(SettingsError::FallbackRejected(reason));
                String::new()
            }
        };

        let duration_minutes = match form.duration.trim() {
            "" => 0,
            raw => match raw.parse::<u32>() {
                Ok(minutes) if minutes <= MAX_CONSENT_DURATION_MINUTES => minutes,
                Ok(_) => {
                    errors.push(SettingsError::DurationOutOfRange);
                    0
                }
                Err(_) => {
                    errors.push(SettingsError::DurationNotInteger);
                    0
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            enabled: form.enabled,
            apply_to_logged_in: form.apply_to_logged_in,
            fallback_url,
            duration_minutes,
        })
    }

    /// Write all four settings to the configuration store.
    pub fn persist(&self, config: &dyn ConfigStore) -> Result<()> {
        config.set(CONFIG_ENABLED, if self.enabled { "true" } else { "false" })?;
        config.set(
            CONFIG_APPLY_LOGGED_IN,
            if self.apply_to_logged_in { "true" } else { "false" },
        )?;
        config.set(CONFIG_FALLBACK_URL, &self.fallback_url)?;
        config.set(CONFIG_CONSENT_DURATION, &self.duration_minutes.to_string())?;
        info!(
            enabled = self.enabled,
            duration_minutes = self.duration_minutes,
            "gate settings updated"
        );
        Ok(())
    }
}
