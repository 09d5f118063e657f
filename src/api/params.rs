//! Ask parameters.
//!
//! Questions arrive as a JSON body, query string, or both. Values are loosely
//! typed: `"0.7"` and `0.7` are the same temperature, `"1"` and `true` the
//! same flag. A body value wins over the same key in the query string.

use std::collections::HashMap;

use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};

/// A scalar parameter as sent by the client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum Loose {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl Loose {
    /// Trimmed string form.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Flag(true) => "1".to_string(),
            Self::Flag(false) => String::new(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }

    #[must_use]
    pub fn number(&self) -> Option<f64> {
        match self {
            Self::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    #[must_use]
    pub fn flag(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => parse_flag(s),
        }
    }
}

/// `1`, `true`, `yes` and `on` (any case) are true; everything else is false.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parameters accepted by the ask endpoints.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct AskRequest {
    /// The question. Required.
    pub q: Option<Loose>,
    /// Subject area used as extra context.
    pub category: Option<Loose>,
    /// Sampling temperature.
    pub temperature: Option<Loose>,
    /// `introductory`, `intermediate` or `advanced`.
    pub expertise: Option<Loose>,
    /// Podcast-style answer (Claude).
    pub podcast: Option<Loose>,
    /// Stream over SSE (Claude, default true).
    pub stream: Option<Loose>,
    /// Nucleus sampling (Gemini).
    pub top_p: Option<Loose>,
    /// Top-k sampling (Gemini).
    pub top_k: Option<Loose>,
    /// Output token cap (Gemini).
    pub max_tokens: Option<Loose>,
}

impl AskRequest {
    /// Merge the JSON body (if the request declares one) over the query
    /// string. An unparseable body counts as absent.
    #[must_use]
    pub fn parse(headers: &HeaderMap, body: &[u8], query: &HashMap<String, String>) -> Self {
        let from_query = Self::from_query(query);
        match Self::from_json_body(headers, body) {
            Some(from_body) => from_body.or(from_query),
            None => from_query,
        }
    }

    fn from_json_body(headers: &HeaderMap, body: &[u8]) -> Option<Self> {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
        if !is_json || body.is_empty() {
            return None;
        }
        match serde_json::from_slice(body) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed JSON body");
                None
            }
        }
    }

    fn from_query(query: &HashMap<String, String>) -> Self {
        let get = |key: &str| query.get(key).map(|v| Loose::Text(v.clone()));
        Self {
            q: get("q"),
            category: get("category"),
            temperature: get("temperature"),
            expertise: get("expertise"),
            podcast: get("podcast"),
            stream: get("stream"),
            top_p: get("top_p"),
            top_k: get("top_k"),
            max_tokens: get("max_tokens"),
        }
    }

    /// Fill gaps in `self` from `fallback`.
    fn or(self, fallback: Self) -> Self {
        Self {
            q: self.q.or(fallback.q),
            category: self.category.or(fallback.category),
            temperature: self.temperature.or(fallback.temperature),
            expertise: self.expertise.or(fallback.expertise),
            podcast: self.podcast.or(fallback.podcast),
            stream: self.stream.or(fallback.stream),
            top_p: self.top_p.or(fallback.top_p),
            top_k: self.top_k.or(fallback.top_k),
            max_tokens: self.max_tokens.or(fallback.max_tokens),
        }
    }

    /// The question, if present and non-blank.
    #[must_use]
    pub fn question(&self) -> Option<String> {
        self.q.as_ref().map(Loose::text).filter(|q| !q.is_empty())
    }

    #[must_use]
    pub fn category(&self) -> String {
        self.category.as_ref().map(Loose::text).unwrap_or_default()
    }

    #[must_use]
    pub fn expertise(&self) -> String {
        self.expertise.as_ref().map(Loose::text).unwrap_or_default()
    }

    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature.as_ref().and_then(Loose::number)
    }

    #[must_use]
    pub fn top_p(&self) -> Option<f64> {
        self.top_p.as_ref().and_then(Loose::number)
    }

    #[must_use]
    pub fn top_k(&self) -> Option<f64> {
        self.top_k.as_ref().and_then(Loose::number)
    }

    #[must_use]
    pub fn max_tokens(&self) -> Option<f64> {
        self.max_tokens.as_ref().and_then(Loose::number)
    }

    #[must_use]
    pub fn podcast(&self) -> bool {
        self.podcast.as_ref().is_some_and(Loose::flag)
    }

    /// Whether to stream; `default` applies when the client did not say.
    #[must_use]
    pub fn stream(&self, default: bool) -> bool {
        self.stream.as_ref().map_or(default, Loose::flag)
    }
}
