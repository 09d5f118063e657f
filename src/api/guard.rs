//! Origin and referer checks for browser callers.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::SharedState;
use super::error::ApiError;
use crate::core::security::{ClientMeta, EventKind, truncate};

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, X-Requested-With";

/// Longest referer recorded in the audit log.
const LOGGED_REFERER_CHARS: usize = 200;

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Caller address and user agent.
fn client_meta(request: &Request) -> ClientMeta {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());
    let user_agent = match header_str(request.headers(), header::USER_AGENT) {
        "" => "unknown".to_string(),
        ua => ua.to_string(),
    };
    ClientMeta { ip, user_agent }
}

/// Reject disallowed origins and referers, answer preflights, and attach
/// CORS headers for allowed origins.
///
/// Also makes the caller's [`ClientMeta`] available to handlers.
pub async fn origin_guard(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = client_meta(&request);
    let origin = header_str(request.headers(), header::ORIGIN).to_string();
    let referer = header_str(request.headers(), header::REFERER).to_string();
    let policy = &state.security.origins;
    let origin_allowed = !origin.is_empty() && policy.allows_origin(&origin);
    let preflight = request.method() == Method::OPTIONS;

    if !preflight {
        if !origin.is_empty() && !origin_allowed {
            state
                .security
                .audit
                .record(
                    EventKind::BlockedOrigin,
                    &client,
                    "Request from unauthorized origin",
                    json!({ "origin": origin }),
                )
                .await;
            return ApiError::Forbidden.into_response();
        }

        if !referer.is_empty() && !policy.allows_referer(&referer) {
            state
                .security
                .audit
                .record(
                    EventKind::BlockedReferer,
                    &client,
                    "Request with unauthorized referer",
                    json!({ "referer": truncate(&referer, LOGGED_REFERER_CHARS) }),
                )
                .await;
            return ApiError::Forbidden.into_response();
        }
    }

    request.extensions_mut().insert(client);
    let mut response = next.run(request).await;

    if origin_allowed
        && let Ok(value) = HeaderValue::from_str(&origin)
    {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        if preflight {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOW_METHODS),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOW_HEADERS),
            );
        }
    }

    response
}

/// Preflight responses carry no body; the guard adds the CORS headers.
pub async fn preflight() -> axum::http::StatusCode {
    axum::http::StatusCode::NO_CONTENT
}
