//! Answer error types.

/// Errors raised while talking to a provider or shaping its answer.
#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    /// API key not configured.
    #[error("API key not configured")]
    ApiKeyMissing,

    /// HTTP request failed (connection refused, DNS, TLS, reset).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider body could not be interpreted.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The overall wall-clock budget for a provider call ran out.
    #[error("provider call timed out after {0}s")]
    Timeout(u64),

    /// Provider returned no usable text.
    #[error("empty response from provider")]
    EmptyResponse,

    /// Provider reported an error inside the event stream.
    #[error("stream error: {0}")]
    Stream(String),

    /// Provider does not offer streaming.
    #[error("{0} does not support streaming")]
    Unsupported(&'static str),
}

impl AnswerError {
    /// Short diagnostic safe to hand back to a client.
    ///
    /// Raw provider payloads are cut to `max` characters.
    #[must_use]
    pub fn detail(&self, max: usize) -> String {
        let text = self.to_string();
        if text.chars().count() <= max {
            text
        } else {
            text.chars().take(max).collect()
        }
    }

    /// Message for a client-facing error event.
    ///
    /// Status codes and kinds only; provider bodies stay in the logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Api { status, .. } => format!("API error (HTTP {status})"),
            Self::Http(_) => "HTTP request failed".to_string(),
            Self::Parse(_) => "failed to parse response".to_string(),
            Self::Stream(message) => {
                format!("stream error: {}", truncate(message, MAX_CLIENT_CHARS))
            }
            other => other.to_string(),
        }
    }
}

/// Longest provider-supplied text echoed in a client error.
pub const MAX_CLIENT_CHARS: usize = 200;

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Result type for answer operations.
pub type Result<T> = std::result::Result<T, AnswerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_truncates_long_payloads() {
        let err = AnswerError::Api {
            status: 500,
            message: "x".repeat(1000),
        };
        assert_eq!(err.detail(40).chars().count(), 40);
        assert!(err.detail(40).starts_with("API error (500)"));
    }

    #[test]
    fn client_message_hides_provider_body() {
        let err = AnswerError::Api {
            status: 500,
            message: "secret internals ".repeat(200),
        };
        assert_eq!(err.client_message(), "API error (HTTP 500)");
        assert_eq!(
            AnswerError::Parse("line 1 col 2".to_string()).client_message(),
            "failed to parse response"
        );
        assert_eq!(AnswerError::Timeout(90).client_message(), "provider call timed out after 90s");

        let long = AnswerError::Stream("y".repeat(1000)).client_message();
        assert_eq!(long.chars().count(), "stream error: ".len() + MAX_CLIENT_CHARS);
    }

    #[test]
    fn detail_keeps_short_messages() {
        assert_eq!(AnswerError::EmptyResponse.detail(500), "empty response from provider");
    }
}
