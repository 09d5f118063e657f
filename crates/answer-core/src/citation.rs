//! Citation link resolution.
//!
//! Turns a bare URL into a markdown link with a human title by fetching the
//! page. Failures never propagate: the link falls back to a title derived
//! from the hostname.

use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use reqwest::redirect::Policy;
use serde::Serialize;

use crate::error::Result;
use crate::source::host_of;

/// Browser-like user agent; some publishers reject unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub const MAX_REDIRECTS: usize = 10;
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest link text kept; longer titles are cut and get `...`.
pub const MAX_TITLE_CHARS: usize = 100;

/// Grounding redirect host used by Gemini. Only useful once resolved.
const VERTEX_REDIRECT: &str = "vertexaisearch.cloud.google.com/grounding-api-redirect/";

/// Pages fetched at once when resolving a batch.
const CONCURRENT_FETCHES: usize = 4;

static MARKDOWN_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\(([^)]+)\)$").ok());
static TITLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok());
static H1: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").ok());
static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());
static ENTITY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").ok());

/// One resolved link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ResolvedLink {
    /// What the caller passed in.
    pub input: String,
    /// URL after redirects.
    pub url: String,
    /// `[title](url)`.
    pub markdown: String,
}

/// Fetches pages to title their links.
#[derive(Debug, Clone)]
pub struct CitationResolver {
    http: reqwest::Client,
}

impl CitationResolver {
    /// Build a resolver with the standard redirect and timeout limits.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built (TLS backend
    /// initialization).
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(FETCH_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    /// Resolve one link.
    ///
    /// Markdown links pass through untouched. Returns `None` only for a
    /// grounding redirect that could not be followed.
    pub async fn resolve(&self, input: &str) -> Option<ResolvedLink> {
        let trimmed = input.trim();
        if let Some(url) = markdown_target(trimmed) {
            return Some(ResolvedLink {
                input: input.to_string(),
                url,
                markdown: trimmed.to_string(),
            });
        }

        let (url, title) = self.fetch(trimmed).await;
        if url == trimmed && url.contains(VERTEX_REDIRECT) {
            tracing::debug!(url = %url, "dropping unresolved grounding redirect");
            return None;
        }

        let text = link_text(title.as_deref(), &url);
        Some(ResolvedLink {
            input: input.to_string(),
            markdown: format!("[{text}]({url})"),
            url,
        })
    }

    /// Resolve a batch, keeping input order and dropping skipped links.
    pub async fn resolve_all<S: AsRef<str> + Sync>(&self, inputs: &[S]) -> Vec<ResolvedLink> {
        futures::stream::iter(inputs.iter().map(|input| self.resolve(input.as_ref())))
            .buffered(CONCURRENT_FETCHES)
            .filter_map(futures::future::ready)
            .boxed()
            .collect()
            .await
    }

    /// Final URL and page title, or the input URL and no title on failure.
    async fn fetch(&self, url: &str) -> (String, Option<String>) {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "citation fetch failed");
                return (url.to_string(), None);
            }
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            tracing::debug!(url = %url, status = %status, "citation fetch rejected");
            return (url.to_string(), None);
        }

        let final_url = response.url().to_string();
        if status != reqwest::StatusCode::OK {
            return (final_url, None);
        }

        match response.text().await {
            Ok(html) => (final_url, extract_title(&html)),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "citation body unreadable");
                (url.to_string(), None)
            }
        }
    }
}

/// Target URL of an already formatted `[text](url)` link.
fn markdown_target(input: &str) -> Option<String> {
    let re = MARKDOWN_LINK.as_ref()?;
    re.captures(input)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
}

/// Page title from `<title>`, else the first `<h1>` with tags stripped.
#[must_use]
pub fn extract_title(html: &str) -> Option<String> {
    let first = |re: &LazyLock<Option<Regex>>| -> Option<String> {
        let raw = re.as_ref()?.captures(html)?.get(1)?.as_str();
        let stripped = match TAG.as_ref() {
            Some(tag) => tag.replace_all(raw, "").into_owned(),
            None => raw.to_string(),
        };
        let text = decode_entities(stripped.trim());
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    };

    first(&TITLE).or_else(|| first(&H1))
}

/// Link text: the page title when known, else a label from the hostname.
///
/// Whitespace runs collapse to one space and long titles are truncated.
#[must_use]
pub fn link_text(title: Option<&str>, url: &str) -> String {
    let text = title
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| host_label(url));
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.chars().count() > MAX_TITLE_CHARS {
        let mut cut: String = text.chars().take(MAX_TITLE_CHARS - 3).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}

/// Hostname without `www.`, first letter upper-cased.
fn host_label(url: &str) -> String {
    let Some(host) = host_of(url) else {
        return "Source".to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut chars = host.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Source".to_string(),
    }
}

/// Decode the HTML entities titles commonly carry.
fn decode_entities(text: &str) -> String {
    let Some(re) = ENTITY.as_ref() else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = name.strip_prefix('#') {
            dec.parse().ok().and_then(char::from_u32)
        } else {
            named_entity(name)
        };
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    })
    .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        _ => return None,
    };
    Some(c)
}
