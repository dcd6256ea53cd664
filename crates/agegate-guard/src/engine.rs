//! Gate engine
//!
//! Ties the stores, the reconciler and the trackers together into the
//! three entry points the host wires up: [`GateEngine::decide`] on every
//! gated request, [`GateEngine::accept`] and [`GateEngine::decline`] on
//! the consent page's form actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agegate_core::{
    AllowReason, ConfigSnapshot, ConfigStore, ConsentDuration, ConsentState, RedirectReason,
    Result, Role, SessionStore, Verdict, VisitorIdentity, DEFAULT_FALLBACK_URL,
};

use crate::consent_store::ConsentStore;
use crate::cookie::{ConsentCookie, CookieReconciler};
use crate::redirect::{percent_encode, GateRoutes, RedirectTracker};
use crate::sanitize::UrlSanitizer;

/// Per-request facts the host hands the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Identity facts, if the host knows who this is.
    pub identity: Option<VisitorIdentity>,
    /// Path and query of the requested page, e.g. `/albums/cat/7?page=2`.
    pub destination: String,
    /// Host serving the request, e.g. `gallery.example`.
    pub host: String,
    /// Whether the request arrived over HTTPS.
    pub https: bool,
    /// Raw value of the persistence cookie, when the client sent one.
    pub consent_token: Option<String>,
    /// Raw `Referer` header, when present.
    pub referer: Option<String>,
}

/// What acceptance produced: a cookie to set and a place to land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub cookie: ConsentCookie,
    pub redirect_to: String,
}

/// Running decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub decisions: u64,
    pub allowed: u64,
    pub redirected: u64,
    pub reconstructed: u64,
    pub expired_clears: u64,
    pub fail_closed: u64,
}

/// The consent gate decision engine.
pub struct GateEngine {
    config: Arc<dyn ConfigStore>,
    session: Arc<dyn SessionStore>,
    routes: GateRoutes,
    sanitizer: UrlSanitizer,
    reconciler: CookieReconciler,
    stats: RwLock<GateStats>,
}

impl GateEngine {
    pub fn new(config: Arc<dyn ConfigStore>, session: Arc<dyn SessionStore>) -> Self {
        Self::with_routes(config, session, GateRoutes::default())
    }

    pub fn with_routes(
        config: Arc<dyn ConfigStore>,
        session: Arc<dyn SessionStore>,
        routes: GateRoutes,
    ) -> Self {
        Self {
            config,
            session,
            routes,
            sanitizer: UrlSanitizer::default(),
            reconciler: CookieReconciler::default(),
            stats: RwLock::new(GateStats::default()),
        }
    }

    pub fn stats(&self) -> GateStats {
        *self.stats.read()
    }

    /// Decide whether this request may reach content.
    ///
    /// Never errors: an internal fault resolves to a fail-closed redirect
    /// (unless the request already targets the consent page, which must
    /// stay reachable or nobody could ever consent).
    pub fn decide(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Verdict {
        let now_secs = now.timestamp();
        match self.decide_inner(ctx, now_secs) {
            Ok(verdict) => {
                self.record(&verdict);
                verdict
            }
            Err(err) => {
                warn!(%err, "gate decision failed, failing closed");
                let verdict = if self.is_consent_page(&ctx.destination) {
                    Verdict::Allow(AllowReason::OnConsentPage)
                } else {
                    Verdict::Redirect {
                        location: self.consent_location(&ctx.destination),
                        reason: RedirectReason::FailClosed,
                    }
                };
                self.stats.write().fail_closed += 1;
                self.record(&verdict);
                verdict
            }
        }
    }

    fn decide_inner(&self, ctx: &RequestContext, now_secs: i64) -> Result<Verdict> {
        let snapshot = self.config.snapshot()?;
        if !snapshot.enabled {
            return Ok(Verdict::Allow(AllowReason::GateDisabled));
        }

        match Role::derive(ctx.identity.as_ref()) {
            Role::Admin => return Ok(Verdict::Allow(AllowReason::AdminBypass)),
            Role::LoggedInUser if !snapshot.apply_to_logged_in => {
                return Ok(Verdict::Allow(AllowReason::LoggedInBypass));
            }
            Role::LoggedInUser | Role::Guest => {}
        }

        if self.is_consent_page(&ctx.destination) {
            return Ok(Verdict::Allow(AllowReason::OnConsentPage));
        }

        let mut consent = ConsentStore::new(self.session.as_ref());
        let mut expired = false;
        match consent.state()? {
            ConsentState::Structured(record) => match snapshot.duration {
                // Not yet loaded; trusting the record now could outlive
                // whatever duration the operator actually configured.
                ConsentDuration::Unknown => {}
                ConsentDuration::Minutes(_) => {
                    if !consent.is_expired(snapshot.duration, now_secs)? {
                        return Ok(Verdict::Allow(AllowReason::ValidConsent));
                    }
                    debug!(
                        age_secs = record.age_secs(now_secs),
                        "structured consent expired, clearing"
                    );
                    consent.clear_consent()?;
                    self.stats.write().expired_clears += 1;
                    expired = true;
                }
            },
            ConsentState::LegacyOnly => {
                // The flag carries no timestamp, so only session-only mode
                // can honour it. Upgrade on the way through.
                if snapshot.duration.is_session_only() {
                    consent.migrate_legacy(now_secs)?;
                    return Ok(Verdict::Allow(AllowReason::LegacyConsent));
                }
            }
            ConsentState::Absent => {}
        }

        if let Some(token) = ctx.consent_token.as_deref() {
            if self
                .reconciler
                .reconstruct(&mut consent, snapshot.duration, token, now_secs)?
            {
                self.stats.write().reconstructed += 1;
                return Ok(Verdict::Allow(AllowReason::ReconstructedConsent));
            }
        }

        let mut redirects = RedirectTracker::new(self.session.as_ref(), self.routes.clone());
        redirects.save(&ctx.destination)?;
        Ok(Verdict::Redirect {
            location: self.consent_location(&ctx.destination),
            reason: if expired {
                RedirectReason::ConsentExpired
            } else {
                RedirectReason::NoConsent
            },
        })
    }

    /// Store a destination carried in the consent page's `?redirect=`
    /// parameter, so acceptance resumes there.
    pub fn remember_destination(&self, raw: &str, ctx: &RequestContext) -> Result<()> {
        let mut redirects = RedirectTracker::new(self.session.as_ref(), self.routes.clone());
        redirects.seed_from_query(raw, &ctx.host)
    }

    /// Record affirmative consent.
    ///
    /// Writes both session representations, rotates the session ID, and
    /// hands back the persistence cookie plus the destination to resume.
    pub fn accept(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Result<AcceptOutcome> {
        let now_secs = now.timestamp();
        let mut consent = ConsentStore::new(self.session.as_ref());
        consent.record_consent(now_secs)?;
        consent.force_rotate(now_secs)?;

        let mut redirects = RedirectTracker::new(self.session.as_ref(), self.routes.clone());
        let redirect_to = redirects.consume()?;
        debug!(%redirect_to, "consent accepted");
        Ok(AcceptOutcome {
            cookie: ConsentCookie::granted_at(now_secs, ctx.https),
            redirect_to,
        })
    }

    /// Record a decline and pick the exit destination.
    ///
    /// Preference order: the sanitized configured fallback, then the
    /// referer (when it is not this consent page), then the built-in
    /// default. Any stored consent is dropped.
    pub fn decline(&self, ctx: &RequestContext) -> Result<String> {
        let snapshot = self.config.snapshot()?;
        let mut consent = ConsentStore::new(self.session.as_ref());
        consent.clear_consent()?;

        if let Some(fallback) = self.sanitized_fallback(&snapshot, &ctx.host) {
            return Ok(fallback);
        }
        if let Some(referer) = ctx.referer.as_deref() {
            if !referer.is_empty() && !self.is_own_consent_url(referer, ctx) {
                return Ok(referer.to_owned());
            }
        }
        Ok(DEFAULT_FALLBACK_URL.to_owned())
    }

    fn sanitized_fallback(&self, snapshot: &ConfigSnapshot, host: &str) -> Option<String> {
        match self.sanitizer.sanitize(&snapshot.fallback_url, true, host) {
            Ok(accepted) => accepted,
            Err(reason) => {
                // A bad stored fallback is an operator problem, not a
                // reason to strand the decliner.
                warn!(reason = reason.description(), "configured fallback URL rejected");
                None
            }
        }
    }

    fn is_own_consent_url(&self, referer: &str, ctx: &RequestContext) -> bool {
        let scheme = if ctx.https { "https" } else { "http" };
        let own = format!("{scheme}://{}{}", ctx.host, self.routes.consent_route);
        referer.split(['?', '#']).next() == Some(own.as_str())
    }

    fn is_consent_page(&self, destination: &str) -> bool {
        destination.split(['?', '#']).next() == Some(self.routes.consent_route.as_str())
    }

    fn consent_location(&self, destination: &str) -> String {
        if destination.is_empty() || destination == "/" {
            return self.routes.consent_route.clone();
        }
        format!(
            "{}?redirect={}",
            self.routes.consent_route,
            percent_encode(destination)
        )
    }

    fn record(&self, verdict: &Verdict) {
        let mut stats = self.stats.write();
        stats.decisions += 1;
        match verdict {
            Verdict::Allow(_) => stats.allowed += 1,
            Verdict::Redirect { .. } => stats.redirected += 1,
        }
    }
}
