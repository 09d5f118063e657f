//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Longest upstream diagnostic returned to clients.
pub const MAX_DETAIL_CHARS: usize = 500;

pub const MISSING_QUESTION: &str =
    "Missing 'q' parameter. Provide your question as JSON {\"q\":\"...\"} or ?q=...";
pub const RATE_LIMITED: &str = "Too many requests. Please wait before trying again.";
pub const BLOCKED: &str = "Your request cannot be processed.";

/// Errors returned by the ask and citation endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", MISSING_QUESTION)]
    MissingQuestion,

    /// Origin or referer not on the allowlist.
    #[error("Forbidden")]
    Forbidden,

    /// Question matched a blocked pattern.
    #[error("{}", BLOCKED)]
    Blocked,

    #[error("{}", RATE_LIMITED)]
    RateLimited,

    /// Provider has no API key.
    #[error("{0} API key not configured")]
    Unavailable(&'static str),

    /// Both provider attempts failed.
    #[error("{message}")]
    Upstream { message: String, detail: String },

    /// Malformed citation request.
    #[error("{0}")]
    Citation(String),
}

impl ApiError {
    /// Upstream failure with a client-safe diagnostic.
    pub fn upstream(message: impl Into<String>, err: &answer_core::AnswerError) -> Self {
        Self::Upstream {
            message: message.into(),
            detail: err.detail(MAX_DETAIL_CHARS),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingQuestion | Self::Citation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden | Self::Blocked => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Upstream { message, detail } => json!({ "error": message, "detail": detail }),
            Self::Citation(error) => json!({ "ok": false, "error": error }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn client_errors_carry_original_messages() {
        let (status, body) = body_of(ApiError::MissingQuestion).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], MISSING_QUESTION);

        let (status, body) = body_of(ApiError::RateLimited).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], RATE_LIMITED);

        let (status, body) = body_of(ApiError::Forbidden).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");
    }

    #[tokio::test]
    async fn upstream_detail_is_truncated() {
        let err = answer_core::AnswerError::Api {
            status: 500,
            message: "x".repeat(2000),
        };
        let (status, body) = body_of(ApiError::upstream("Gemini fallback failed", &err)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Gemini fallback failed");
        assert_eq!(body["detail"].as_str().unwrap().chars().count(), MAX_DETAIL_CHARS);
    }

    #[tokio::test]
    async fn citation_errors_use_ok_flag() {
        let (status, body) = body_of(ApiError::Citation("Invalid JSON input".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Invalid JSON input");
    }
}
