//! Agegate guard
//!
//! The consent decision and reconciliation engine that sits in front of a
//! content site: guests (and optionally logged-in users) must affirmatively
//! consent before reaching content; decliners leave through a vetted
//! fallback URL.
//!
//! # Architecture
//!
//! ```text
//! request ──▶ GateEngine::decide
//!               │ config snapshot (ConfigStore)
//!               │ role exemptions (Role)
//!               │ session consent + expiry (ConsentStore over SessionCache)
//!               │ cookie reconstruction (CookieReconciler)
//!               │ destination capture (RedirectTracker)
//!               ▼
//!        Allow(reason) │ Redirect(consent page + ?redirect=…)
//! ```
//!
//! The engine reconciles three independently stale sources of truth (the
//! session record, the client persistence token and the persisted
//! configuration) and fails closed: any internal fault during a decision
//! resolves to a redirect, never to a panic or an error for the caller.
//!
//! On the consent page itself, [`GateEngine::accept`] and
//! [`GateEngine::decline`] write through the same stores, and every
//! externally supplied URL passes through [`UrlSanitizer`] before it can
//! become a redirect target.

pub mod admin;
pub mod cookie;
pub mod consent_store;
pub mod engine;
pub mod redirect;
pub mod sanitize;
pub mod session_cache;

pub use admin::*;
pub use consent_store::*;
pub use cookie::*;
pub use engine::*;
pub use redirect::*;
pub use sanitize::*;
pub use session_cache::*;

pub use agegate_core::{GateError, Result};
