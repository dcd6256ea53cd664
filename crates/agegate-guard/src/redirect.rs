//! Route layout and preserved-destination tracking
//!
//! When the gate bounces a visitor to the consent page it remembers where
//! they were headed, so acceptance can land them back on the page they
//! asked for. The saved target is attacker-influenced twice over (it can
//! arrive via the `?redirect=` query parameter), so it is validated on the
//! way in and again on the way out.

use tracing::debug;
use url::Url;

use agegate_core::{Result, SessionStore, SessionValue, SESSION_REDIRECT_KEY};

use crate::session_cache::SessionCache;

/// The site routes the gate needs to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRoutes {
    /// The consent page itself.
    pub consent_route: String,
    /// Root of the gated content subtree.
    pub content_root: String,
}

impl Default for GateRoutes {
    fn default() -> Self {
        Self {
            consent_route: "/index.php".into(),
            content_root: "/albums".into(),
        }
    }
}

impl GateRoutes {
    /// Default landing page inside the content subtree.
    pub fn content_index(&self) -> String {
        format!("{}/index.php", self.content_root)
    }

    /// Whether `path` (query already stripped) sits inside the gated
    /// content subtree.
    pub fn in_content_subtree(&self, path: &str) -> bool {
        match path.strip_prefix(&self.content_root) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Saves and replays the destination a gated visitor was heading for.
pub struct RedirectTracker<'a> {
    cache: SessionCache<'a>,
    routes: GateRoutes,
}

impl<'a> RedirectTracker<'a> {
    pub fn new(store: &'a dyn SessionStore, routes: GateRoutes) -> Self {
        Self {
            cache: SessionCache::new(store),
            routes,
        }
    }

    /// Remember the destination, overwriting any earlier one. The newest
    /// attempt is the one acceptance should resume.
    pub fn save(&mut self, destination: &str) -> Result<()> {
        self.cache
            .set(SESSION_REDIRECT_KEY, SessionValue::Text(destination.into()))?;
        Ok(())
    }

    /// Take the saved destination, deleting it so it replays at most once.
    ///
    /// The value is re-validated here; a tampered session yields the
    /// content index rather than an open redirect.
    pub fn consume(&mut self) -> Result<String> {
        let saved = self
            .cache
            .get(SESSION_REDIRECT_KEY)?
            .as_ref()
            .and_then(SessionValue::as_text)
            .map(str::to_owned);
        self.cache.remove(SESSION_REDIRECT_KEY)?;
        Ok(match saved {
            Some(target) if self.is_safe_target(&target) => target,
            Some(_) | None => self.routes.content_index(),
        })
    }

    /// Seed the saved destination from a `?redirect=` query value.
    ///
    /// Unusable values degrade to the content index instead of being
    /// dropped, so acceptance always has somewhere to land.
    pub fn seed_from_query(&mut self, raw: &str, current_host: &str) -> Result<()> {
        let decoded = percent_decode(raw);
        let candidate = reduce_to_local(&decoded, current_host);
        let target = match candidate {
            Some(path) if self.is_safe_target(&path) => path,
            _ => {
                debug!("unusable redirect parameter, falling back to content index");
                self.routes.content_index()
            }
        };
        self.save(&target)
    }

    /// A destination is replayable only as a same-origin path inside the
    /// gated content subtree.
    fn is_safe_target(&self, target: &str) -> bool {
        if !target.starts_with('/') || target.starts_with("//") {
            return false;
        }
        if target.contains("://") || target.contains("..") || target.contains('\\') {
            return false;
        }
        let path = target.split(['?', '#']).next().unwrap_or(target);
        self.routes.in_content_subtree(path)
    }
}

/// Reduce a decoded redirect value to a local path, if it is one.
///
/// Absolute same-origin URLs collapse to their path and query; absolute
/// foreign URLs are unusable and return `None`.
fn reduce_to_local(decoded: &str, current_host: &str) -> Option<String> {
    let lower = decoded.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let parsed = Url::parse(decoded).ok()?;
        let host = parsed.host_str()?;
        if !host.eq_ignore_ascii_case(current_host) {
            return None;
        }
        let mut local = parsed.path().to_owned();
        if let Some(query) = parsed.query() {
            local.push('?');
            local.push_str(query);
        }
        return Some(local);
    }
    Some(decoded.to_owned())
}

/// Percent-encode a string for use as a query parameter value.
pub fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Decode a percent-encoded query value. `+` decodes to a space; invalid
/// escapes pass through untouched.
pub fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => match (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push(hi * 16 + lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(byte: Option<&u8>) -> Option<u8> {
    match byte? {
        b @ b'0'..=b'9' => Some(b - b'0'),
        b @ b'a'..=b'f' => Some(b - b'a' + 10),
        b @ b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agegate_core::MemorySessionStore;

    fn tracker(store: &MemorySessionStore) -> RedirectTracker<'_> {
        RedirectTracker::new(store, GateRoutes::default())
    }

    #[test]
    fn save_overwrites_and_consume_deletes() {
        let store = MemorySessionStore::new();
        let mut redirects = tracker(&store);
        redirects.save("/albums/cat/7").unwrap();
        redirects.save("/albums/picture/42").unwrap();
        assert_eq!(redirects.consume().unwrap(), "/albums/picture/42");
        // Consumed once; the next read falls back to the index.
        assert_eq!(redirects.consume().unwrap(), "/albums/index.php");
    }

    #[test]
    fn tampered_saved_target_degrades_to_index() {
        let store = MemorySessionStore::new();
        store
            .set(
                SESSION_REDIRECT_KEY,
                SessionValue::Text("https://evil.example/".into()),
            )
            .unwrap();
        let mut redirects = tracker(&store);
        assert_eq!(redirects.consume().unwrap(), "/albums/index.php");
    }

    #[test]
    fn seed_accepts_content_paths() {
        let store = MemorySessionStore::new();
        let mut redirects = tracker(&store);
        redirects
            .seed_from_query("%2Falbums%2Fcat%2F7", "gallery.example")
            .unwrap();
        assert_eq!(redirects.consume().unwrap(), "/albums/cat/7");
    }

    #[test]
    fn seed_reduces_same_origin_absolute_urls() {
        let store = MemorySessionStore::new();
        let mut redirects = tracker(&store);
        redirects
            .seed_from_query("https://gallery.example/albums/cat/7?page=2", "gallery.example")
            .unwrap();
        assert_eq!(redirects.consume().unwrap(), "/albums/cat/7?page=2");
    }

    #[test]
    fn seed_rejects_cross_origin_and_foreign_paths() {
        let store = MemorySessionStore::new();
        let mut redirects = tracker(&store);
        redirects
            .seed_from_query("https://evil.example/albums/cat/7", "gallery.example")
            .unwrap();
        assert_eq!(redirects.consume().unwrap(), "/albums/index.php");

        redirects
            .seed_from_query("/admin/config", "gallery.example")
            .unwrap();
        assert_eq!(redirects.consume().unwrap(), "/albums/index.php");
    }

    #[test]
    fn protocol_relative_and_traversal_targets_are_unsafe() {
        let store = MemorySessionStore::new();
        let mut redirects = tracker(&store);
        for bad in ["//evil.example/x", "/albums/../admin", "/albums\\x"] {
            redirects.seed_from_query(bad, "gallery.example").unwrap();
            assert_eq!(redirects.consume().unwrap(), "/albums/index.php", "{bad}");
        }
    }

    #[test]
    fn percent_round_trip() {
        let raw = "/albums/cat/7?page=2&q=a b";
        assert_eq!(percent_decode(&percent_encode(raw)), raw);
        assert_eq!(percent_decode("a+b%2Fc"), "a b/c");
        assert_eq!(percent_decode("100%"), "100%");
    }
}
