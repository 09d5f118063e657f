//! Anthropic (Claude) provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::error::{AnswerError, Result};
use crate::provider::{AnswerProvider, CompletionRequest, EventStream, ProviderAnswer};
use crate::source::SourceOrder;
use crate::sse::{self, LineBuffer};
use crate::types::{Message, MessagesRequest, MessagesResponse, ServerTool, SystemBlock};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Overall budget for one call, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Web searches allowed per answer.
pub const DEFAULT_MAX_SEARCH_USES: u32 = 3;

/// Anthropic (Claude) answer provider.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    timeout: Duration,
    max_search_uses: u32,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
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
            api_url: API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_search_uses: DEFAULT_MAX_SEARCH_USES,
        })
    }

    /// Send requests to a different Messages endpoint.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_search_uses(mut self, max_uses: u32) -> Self {
        self.max_search_uses = max_uses;
        self
    }

    fn build_request(&self, request: CompletionRequest, stream: bool) -> MessagesRequest {
        let mut system = vec![SystemBlock::cached(request.system.cached)];
        if let Some(dynamic) = request.system.dynamic.filter(|d| !d.is_empty()) {
            system.push(SystemBlock::plain(dynamic));
        }

        MessagesRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            system,
            messages: vec![Message::user(request.question)],
            tools: request
                .web_search
                .then(|| vec![ServerTool::web_search(self.max_search_uses)]),
            // The API default is 1.0, so it is only sent when it differs.
            temperature: request
                .temperature
                .filter(|t| (t - 1.0).abs() > f32::EPSILON),
            stream,
        }
    }

    async fn send(&self, body: &MessagesRequest) -> Result<reqwest::Response> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| AnswerError::ApiKeyMissing)?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        let response = self
            .http
            .post(&self.api_url)
            .headers(headers)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnswerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

/// Map a reqwest failure, singling out an expired budget.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> AnswerError {
    if err.is_timeout() {
        AnswerError::Timeout(timeout.as_secs())
    } else {
        AnswerError::Http(err)
    }
}

/// Collect text, sources and the search signal from a complete body.
///
/// Inline citations are recorded as cited, search results as searched-only,
/// so cited-first ranking can put them ahead.
fn read_response(response: MessagesResponse) -> ProviderAnswer {
    let mut answer = ProviderAnswer {
        search_used: response.usage.web_search_requests() > 0,
        ..ProviderAnswer::default()
    };

    for block in &response.content {
        if let Some(text) = block.text.as_deref().filter(|_| block.kind == "text") {
            answer.text.push_str(text);
        }
        for source in block.cited_sources() {
            answer.sources.cite(source);
        }
        if block.is_search_use() {
            answer.search_used = true;
        }
    }

    for block in response
        .content
        .iter()
        .filter(|b| b.is_search_result() || b.is_tool_result())
    {
        for source in block.result_sources() {
            if !answer.sources.contains(&source.url) {
                answer.sources.insert(source);
            }
        }
    }

    for source in response
        .citations
        .iter()
        .flatten()
        .filter_map(crate::types::Citation::to_source)
    {
        answer.sources.cite(source);
    }

    answer
}

#[async_trait]
impl AnswerProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn source_order(&self) -> SourceOrder {
        SourceOrder::CitedFirst
    }

    async fn complete(&self, request: CompletionRequest) -> Result<ProviderAnswer> {
        let body = self.build_request(request, false);
        let response = self.send(&body).await?;
        let raw = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let parsed: MessagesResponse =
            serde_json::from_str(&raw).map_err(|e| AnswerError::Parse(e.to_string()))?;
        Ok(read_response(parsed))
    }

    async fn stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let body = self.build_request(request, true);
        let response = self.send(&body).await?;
        let timeout = self.timeout;

        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = LineBuffer::new();

            futures::pin_mut!(byte_stream);

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(transport_error(e, timeout));
                        return;
                    }
                };

                let lines = match buffer.push(&chunk) {
                    Ok(lines) => lines,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                for line in lines {
                    if let Some(event) = sse::parse_line(&line) {
                        yield Ok(event);
                    }
                }
            }

            if let Some(event) = buffer.finish().as_deref().and_then(sse::parse_line) {
                yield Ok(event);
            }
        };

        Ok(Box::pin(stream))
    }
}
