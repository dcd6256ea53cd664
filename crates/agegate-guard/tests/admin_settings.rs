//! Settings form validation and its effect on live decisions.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use agegate_core::{
    AllowReason, ConfigStore, MemoryConfigStore, MemorySessionStore, Verdict, VisitorIdentity,
    CONFIG_CONSENT_DURATION,
};
use agegate_guard::{
    GateEngine, RejectReason, RequestContext, SettingsError, SettingsForm, ValidatedSettings,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn form(enabled: bool, fallback: &str, duration: &str) -> SettingsForm {
    SettingsForm {
        enabled,
        apply_to_logged_in: false,
        fallback_url: fallback.into(),
        duration: duration.into(),
    }
}

#[test]
fn invalid_form_persists_nothing() {
    let config = MemoryConfigStore::new();
    let result = ValidatedSettings::from_form(
        &form(true, "javascript:alert(1)", "abc"),
        "gallery.example",
    );
    assert!(result.is_err());
    // The store never saw a write.
    assert_eq!(config.get(CONFIG_CONSENT_DURATION).unwrap(), None);
}

#[test]
fn every_problem_is_reported_in_one_pass() {
    let errors = ValidatedSettings::from_form(
        &form(true, "https://gallery.example/self", "43201"),
        "gallery.example",
    )
    .unwrap_err();
    assert_eq!(
        errors,
        vec![
            SettingsError::FallbackInternal,
            SettingsError::DurationOutOfRange,
        ]
    );
}

#[test]
fn rejection_reasons_surface_to_the_form() {
    let errors =
        ValidatedSettings::from_form(&form(true, "/relative", "60"), "gallery.example").unwrap_err();
    assert_eq!(
        errors,
        vec![SettingsError::FallbackRejected(RejectReason::NotHttp)]
    );
    assert!(!errors[0].description().is_empty());
}

#[test]
fn saved_settings_drive_the_next_decision() {
    let config = Arc::new(MemoryConfigStore::new());
    let session = Arc::new(MemorySessionStore::new());
    let engine = GateEngine::new(config.clone(), session);

    let settings = ValidatedSettings::from_form(
        &form(true, "https://exit.example", "5"),
        "gallery.example",
    )
    .unwrap();
    settings.persist(config.as_ref()).unwrap();

    let ctx = RequestContext {
        identity: Some(VisitorIdentity::guest()),
        destination: "/albums/cat/7".into(),
        host: "gallery.example".into(),
        https: true,
        consent_token: None,
        referer: None,
    };
    engine.accept(&ctx, at(1_000)).unwrap();
    assert_eq!(
        engine.decide(&ctx, at(1_299)),
        Verdict::Allow(AllowReason::ValidConsent)
    );
    assert!(!engine.decide(&ctx, at(1_300)).allows());

    // Disabling the gate takes effect immediately.
    ValidatedSettings::from_form(&form(false, "", ""), "gallery.example")
        .unwrap()
        .persist(config.as_ref())
        .unwrap();
    assert_eq!(
        engine.decide(&ctx, at(1_301)),
        Verdict::Allow(AllowReason::GateDisabled)
    );
}

#[test]
fn blank_form_yields_session_only_defaults() {
    let settings =
        ValidatedSettings::from_form(&form(true, "", ""), "gallery.example").unwrap();
    assert_eq!(settings.duration_minutes, 0);
    assert!(settings.fallback_url.is_empty());
}
