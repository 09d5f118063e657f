//! Google Gemini provider implementation.
//!
//! Gemini is called through `generateContent` only; it has no streaming
//! path here. Grounding metadata comes in several loosely specified shapes,
//! so the response is read as a [`Value`] and inspected field by field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use super::anthropic::transport_error;
use crate::error::{AnswerError, Result};
use crate::provider::{AnswerProvider, CompletionRequest, ProviderAnswer};
use crate::source::{Source, SourceSet};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Overall budget for one call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Grounding buckets that list source items.
const SOURCE_BUCKETS: &[&str] = &["groundingChunks", "supportingEvidence", "sources"];

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {
    google_search: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GoogleSearch>>,
}

/// Google Gemini answer provider.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AnswerError::ApiKeyMissing);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            api_base: API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Use a different API base (everything before `/models`).
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Concatenated text of the first candidate.
fn extract_text(body: &Value) -> String {
    body.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Web sources in the first candidate's grounding metadata.
///
/// Only `http(s)` URLs are kept, deduplicated in encounter order.
fn extract_sources(body: &Value) -> SourceSet {
    let mut sources = SourceSet::new();
    let Some(meta) = body.pointer("/candidates/0/groundingMetadata") else {
        return sources;
    };

    let mut push = |url: Option<&str>, title: Option<&str>| {
        let Some(url) = url.map(str::trim).filter(|u| is_web_url(u)) else {
            return;
        };
        if sources.contains(url) {
            return;
        }
        if let Some(source) = Source::new(url, title.unwrap_or_default()) {
            sources.insert(source);
        }
    };

    push(
        meta.pointer("/searchEntryPoint/url").and_then(Value::as_str),
        None,
    );

    for bucket in SOURCE_BUCKETS {
        let Some(items) = meta.get(*bucket).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let title = item.pointer("/web/title").and_then(Value::as_str);
            push(item.pointer("/web/uri").and_then(Value::as_str), title);
            push(item.get("sourceUrl").and_then(Value::as_str), None);
            push(item.pointer("/metadata/url").and_then(Value::as_str), None);
            push(item.get("url").and_then(Value::as_str), None);
        }
    }

    sources
}

/// Whether grounding metadata reports any search queries.
fn reports_search(body: &Value) -> bool {
    body.pointer("/candidates/0/groundingMetadata/webSearchQueries")
        .and_then(Value::as_array)
        .is_some_and(|q| !q.is_empty())
}

fn is_web_url(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[async_trait]
impl AnswerProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn resolves_links(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<ProviderAnswer> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| AnswerError::ApiKeyMissing)?,
        );

        let system = request.system.joined();
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: &request.question,
                }],
            }],
            system_instruction: Content {
                role: "system",
                parts: vec![Part { text: &system }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: request.top_k,
                max_output_tokens: request.max_tokens,
            },
            tools: request.web_search.then(|| {
                vec![GoogleSearch {
                    google_search: serde_json::Map::new(),
                }]
            }),
        };

        let url = format!("{}/models/{}:generateContent", self.api_base, request.model);
        let response = self
            .http
            .post(url)
            .headers(headers)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        if !status.is_success() {
            return Err(AnswerError::Api {
                status: status.as_u16(),
                message: raw,
            });
        }

        let parsed: Value =
            serde_json::from_str(&raw).map_err(|e| AnswerError::Parse(e.to_string()))?;
        if !parsed.is_object() {
            return Err(AnswerError::Parse("response is not a JSON object".to_string()));
        }

        let sources = extract_sources(&parsed);
        Ok(ProviderAnswer {
            text: extract_text(&parsed),
            search_used: reports_search(&parsed),
            sources,
        })
    }
}
