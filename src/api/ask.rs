//! Ask and citation handlers.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use answer_core::provider::EventStream;
use answer_core::types::StreamEvent;
use answer_core::{
    AnswerMode, AnswerProvider, AnswerResult, ClientEvent, CompletionRequest, aggregate,
    answer_with_fallback,
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::SharedState;
use super::error::ApiError;
use super::params::AskRequest;
use crate::core::prompt::{self, ClaudeOptions, Expertise, GeminiOptions};
use crate::core::security::{ClientMeta, Verdict};

/// Client events buffered before the producer waits on a slow reader.
const EVENT_BUFFER: usize = 32;

/// Answer with Claude, streamed over SSE unless `stream` is false.
#[utoipa::path(
    method(get, post),
    path = "/api/ask-claude",
    request_body = AskRequest,
    responses(
        (status = 200, description = "SSE stream of text chunks ending in done or error, or an AnswerResult when stream=false", body = AnswerResult),
        (status = 400, description = "Missing question"),
        (status = 403, description = "Origin, referer or content blocked"),
        (status = 429, description = "Rate limited"),
        (status = 502, description = "Provider failed after fallback"),
        (status = 503, description = "No API key configured")
    )
)]
pub async fn ask_claude(
    State(state): State<SharedState>,
    Extension(client): Extension<ClientMeta>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let provider = state.claude.clone().ok_or(ApiError::Unavailable("Claude"))?;
    let params = AskRequest::parse(&headers, &body, &query);
    let question = admit(&state, &client, &params, provider.name()).await?;

    let options = ClaudeOptions {
        category: params.category(),
        expertise: Expertise::parse(&params.expertise()),
        podcast: params.podcast(),
        temperature: prompt::clamp(params.temperature(), 0.0, 1.0, prompt::DEFAULT_TEMPERATURE),
    };
    let request = prompt::claude_request(&state.claude_model, &question, &options);

    if params.stream(true) {
        return Ok(stream_answer(state, provider, request, client, question).await);
    }

    let result = answer_with_fallback(provider.as_ref(), &request, None)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "claude request failed");
            ApiError::upstream("Claude request failed", &e)
        })?;
    Ok(finish(&state, &client, &question, result).await)
}

/// Answer with Gemini: a search-grounded attempt, then a model-only retry.
#[utoipa::path(
    method(get, post),
    path = "/api/ask",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer", body = AnswerResult),
        (status = 400, description = "Missing question"),
        (status = 403, description = "Origin, referer or content blocked"),
        (status = 429, description = "Rate limited"),
        (status = 502, description = "Provider failed after fallback"),
        (status = 503, description = "No API key configured")
    )
)]
pub async fn ask_gemini(
    State(state): State<SharedState>,
    Extension(client): Extension<ClientMeta>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let provider = state.gemini.clone().ok_or(ApiError::Unavailable("Gemini"))?;
    let params = AskRequest::parse(&headers, &body, &query);
    let question = admit(&state, &client, &params, provider.name()).await?;

    let options = GeminiOptions::from_raw(
        params.category(),
        params.temperature(),
        params.top_p(),
        params.top_k(),
        params.max_tokens(),
    );
    let request = prompt::gemini_request(&state.gemini_model, &question, &options);

    let result = answer_with_fallback(provider.as_ref(), &request, Some(&state.resolver))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "gemini fallback failed");
            ApiError::upstream("Gemini fallback failed", &e)
        })?;
    Ok(finish(&state, &client, &question, result).await)
}

/// Require a question and pass the rate limit and content filter.
async fn admit(
    state: &SharedState,
    client: &ClientMeta,
    params: &AskRequest,
    llm: &str,
) -> Result<String, ApiError> {
    let question = params.question().ok_or(ApiError::MissingQuestion)?;
    match state.security.screen(client, &question, llm).await {
        Verdict::Allowed => Ok(question),
        Verdict::RateLimited => Err(ApiError::RateLimited),
        Verdict::Blocked => Err(ApiError::Blocked),
    }
}

/// Audit safety flags and serialize the result.
async fn finish(
    state: &SharedState,
    client: &ClientMeta,
    question: &str,
    result: AnswerResult,
) -> Response {
    if result.mode == AnswerMode::Blocked {
        state.security.flagged(client, question, &result.llm).await;
    }
    Json(result).into_response()
}

/// Pipe aggregated provider events to the client as SSE.
///
/// The producer task stops as soon as the client goes away.
async fn stream_answer(
    state: SharedState,
    provider: Arc<dyn AnswerProvider>,
    request: CompletionRequest,
    client: ClientMeta,
    question: String,
) -> Response {
    let llm = provider.name();
    let events: EventStream = match provider.stream(request).await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(provider = llm, error = %e, "stream request failed");
            Box::pin(futures::stream::once(async move { Err::<StreamEvent, _>(e) }))
        }
    };

    let (tx, rx) = tokio::sync::mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        let events = aggregate(events, llm);
        tokio::pin!(events);

        while let Some(event) = events.next().await {
            if matches!(&event, ClientEvent::Done(result) if result.mode == AnswerMode::Blocked) {
                state.security.flagged(&client, &question, llm).await;
            }
            if tx.send(event).await.is_err() {
                tracing::debug!(provider = llm, "client disconnected, dropping stream");
                return;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().data(data))
    });

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Links to resolve. Either key is accepted.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CitationRequest {
    pub links: Option<Vec<String>>,
    pub urls: Option<Vec<String>>,
}

/// One resolved link.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CitationItem {
    pub input: String,
    pub url: String,
    pub markdown: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CitationResponse {
    pub ok: bool,
    pub items: Vec<CitationItem>,
    /// Resolved URLs, in item order.
    pub ask_links: Vec<String>,
}

/// Resolve URLs into titled markdown links.
#[utoipa::path(
    post,
    path = "/api/citation",
    request_body = CitationRequest,
    responses(
        (status = 200, description = "Resolved links", body = CitationResponse),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn citation(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<CitationResponse>, ApiError> {
    let links = citation_links(&body)?;
    let resolved = state.resolver.resolve_all(&links).await;

    let items: Vec<CitationItem> = resolved
        .into_iter()
        .map(|link| CitationItem {
            input: link.input,
            url: link.url,
            markdown: link.markdown,
            status: "ok",
        })
        .collect();
    let ask_links = items.iter().map(|item| item.url.clone()).collect();

    Ok(Json(CitationResponse {
        ok: true,
        items,
        ask_links,
    }))
}

fn citation_links(body: &[u8]) -> Result<Vec<String>, ApiError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::Citation("Invalid JSON input".to_string()))?;

    let links = match value.get("links").or_else(|| value.get("urls")) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ApiError::Citation("`links` must be an array".to_string())),
    };

    Ok(links
        .iter()
        .filter_map(Value::as_str)
        .map(ToString::to_string)
        .collect())
}
