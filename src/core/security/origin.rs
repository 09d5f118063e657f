//! Origin and referer allowlist.

use std::sync::LazyLock;

use regex::Regex;

static LOCAL_ORIGIN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https?://(localhost|127\.0\.0\.1)(:\d+)?$").ok());
static LOCAL_REFERER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https?://(localhost|127\.0\.0\.1)(:\d+)?/").ok());

/// Origins served when none are configured.
pub const DEFAULT_ORIGINS: &[&str] = &[
    "https://quarex.org",
    "https://www.quarex.org",
    "http://quarex.org",
    "http://www.quarex.org",
    "https://truthangel.org",
    "https://www.truthangel.org",
    "http://truthangel.org",
    "http://www.truthangel.org",
    "http://localhost",
    "http://127.0.0.1",
];

/// Which browser origins may call the API.
///
/// Local development origins on any port are always allowed.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGINS.iter().map(ToString::to_string))
    }
}

impl OriginPolicy {
    /// Allow exactly the given origins (plus local ones).
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed
                .into_iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    /// Whether an `Origin` header value is allowed.
    #[must_use]
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed.iter().any(|a| a == origin)
            || LOCAL_ORIGIN.as_ref().is_some_and(|re| re.is_match(origin))
    }

    /// Whether a `Referer` header value starts with an allowed origin.
    #[must_use]
    pub fn allows_referer(&self, referer: &str) -> bool {
        self.allowed.iter().any(|a| referer.starts_with(a.as_str()))
            || LOCAL_REFERER.as_ref().is_some_and(|re| re.is_match(referer))
    }
}
