//! Session cookie jar shared by every request of an `HttpSession`.
//!
//! [`SessionCookieJar`] implements `reqwest::cookie::CookieStore`, so the
//! client stores `Set-Cookie` headers and attaches matching cookies during
//! request execution. Unlike `reqwest::cookie::Jar` the stored cookies can be
//! listed, which is what persistence across runs needs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

/// A single cookie as held by the jar and written to the cookie file.
///
/// The value field is redacted in Debug output to prevent accidental logging
/// of session tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value. Sensitive, never log.
    value: String,
    /// Lowercase domain without leading dot.
    pub domain: String,
    /// Whether the cookie only matches `domain` exactly (no `Domain` attribute was sent).
    pub host_only: bool,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Unix timestamp for expiry (`None` = session cookie).
    pub expires: Option<u64>,
}

impl StoredCookie {
    /// Creates a new cookie entry.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            host_only: false,
            path: path.into(),
            secure: false,
            expires: None,
        }
    }

    /// Sets the expiry timestamp.
    #[must_use]
    pub fn with_expires(mut self, expires: Option<u64>) -> Self {
        self.expires = expires;
        self
    }

    /// Sets the secure flag.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the cookie has an expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn key(&self) -> CookieKey {
        CookieKey {
            domain: self.domain.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
        }
    }

    fn matches(&self, url: &Url, now: u64) -> bool {
        if self.is_expired_at(now) {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };
        domain_ok && path_matches(url.path(), &self.path)
    }
}

// Custom Debug impl that redacts the cookie value.
impl fmt::Debug for StoredCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("host_only", &self.host_only)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .finish()
    }
}

/// Identity of a cookie within the jar; orders the jar deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CookieKey {
    domain: String,
    path: String,
    name: String,
}

/// Ordered, thread-safe cookie set used as the session's cookie provider.
#[derive(Default)]
pub struct SessionCookieJar {
    cookies: RwLock<BTreeMap<CookieKey, StoredCookie>>,
}

impl SessionCookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar pre-filled with previously persisted cookies.
    ///
    /// Cookies already expired are dropped.
    #[must_use]
    pub fn from_cookies(cookies: impl IntoIterator<Item = StoredCookie>) -> Self {
        let now = unix_now();
        let map = cookies
            .into_iter()
            .filter(|cookie| !cookie.is_expired_at(now))
            .map(|cookie| (cookie.key(), cookie))
            .collect();
        Self {
            cookies: RwLock::new(map),
        }
    }

    /// Returns a copy of every unexpired cookie, ordered by domain, path and name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StoredCookie> {
        let now = unix_now();
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cookie| !cookie.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Returns the number of cookies held (expired entries included until next write).
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true when the jar holds no cookie.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when an unexpired cookie's name contains `fragment`.
    #[must_use]
    pub fn contains_name(&self, fragment: &str) -> bool {
        let now = unix_now();
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|cookie| !cookie.is_expired_at(now) && cookie.name.contains(fragment))
    }

    fn store_set_cookie(&self, header: &str, url: &Url, now: u64) {
        let Ok(parsed) = cookie::Cookie::parse(header) else {
            debug!(url = %url, "ignoring unparseable Set-Cookie header");
            return;
        };
        let Some(host) = url.host_str().map(str::to_lowercase) else {
            return;
        };

        let (domain, host_only) = match parsed.domain().map(normalize_domain) {
            Some(domain) if !domain.is_empty() => {
                if !domain_matches(&host, &domain) {
                    debug!(host = %host, domain = %domain, "rejecting cookie for foreign domain");
                    return;
                }
                (domain, false)
            }
            _ => (host, true),
        };

        let path = parsed
            .path()
            .filter(|path| path.starts_with('/'))
            .map_or_else(|| default_path(url), str::to_string);

        let expires = if let Some(max_age) = parsed.max_age() {
            let seconds = max_age.whole_seconds();
            if seconds <= 0 {
                Some(0)
            } else {
                Some(now.saturating_add(seconds.unsigned_abs()))
            }
        } else {
            parsed
                .expires_datetime()
                .map(|at| u64::try_from(at.unix_timestamp()).unwrap_or(0))
        };

        let stored = StoredCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            host_only,
            path,
            secure: parsed.secure().unwrap_or(false),
            expires,
        };

        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        if stored.is_expired_at(now) {
            if cookies.remove(&stored.key()).is_some() {
                trace!(name = %stored.name, domain = %stored.domain, "removed expired cookie");
            }
            return;
        }
        trace!(name = %stored.name, domain = %stored.domain, "stored cookie");
        cookies.insert(stored.key(), stored);
    }
}

impl fmt::Debug for SessionCookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookieJar")
            .field("cookies", &self.len())
            .finish()
    }
}

impl CookieStore for SessionCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = unix_now();
        for header in cookie_headers {
            if let Ok(header) = header.to_str() {
                self.store_set_cookie(header, url, now);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let now = unix_now();
        let header = self
            .cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cookie| cookie.matches(url, now))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_lowercase()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path[cookie_path.len()..].starts_with('/'))
}

/// Default cookie path: the request path up to, not including, its last `/`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}
