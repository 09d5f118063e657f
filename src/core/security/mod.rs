//! Request screening: origin allowlist, per-client rate limit, blocked
//! content patterns and the audit log they all write to.

pub mod audit;
pub mod filter;
pub mod origin;
pub mod rate_limit;

pub use audit::{AuditLog, EventKind};
pub use filter::ContentFilter;
pub use origin::OriginPolicy;
pub use rate_limit::RateLimiter;

use serde_json::json;

/// Longest query kept in rate-limit log entries.
const RATE_LIMIT_QUERY_CHARS: usize = 100;

/// Longest query kept in other log entries.
const LOGGED_QUERY_CHARS: usize = 200;

/// Who sent a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

impl Default for ClientMeta {
    fn default() -> Self {
        Self {
            ip: "unknown".to_string(),
            user_agent: "unknown".to_string(),
        }
    }
}

/// Outcome of screening a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    RateLimited,
    Blocked,
}

/// All request-level controls.
#[derive(Debug, Clone)]
pub struct Security {
    pub origins: OriginPolicy,
    pub filter: ContentFilter,
    pub limiter: RateLimiter,
    pub audit: AuditLog,
}

impl Security {
    #[must_use]
    pub const fn new(
        origins: OriginPolicy,
        filter: ContentFilter,
        limiter: RateLimiter,
        audit: AuditLog,
    ) -> Self {
        Self {
            origins,
            filter,
            limiter,
            audit,
        }
    }

    /// Apply the rate limit, then the content filter, logging the outcome.
    ///
    /// A limiter that cannot reach its state file lets the request through.
    pub async fn screen(&self, client: &ClientMeta, question: &str, llm: &str) -> Verdict {
        let within_limit = match self.limiter.check(&client.ip).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(error = %e, "rate limiter unavailable");
                true
            }
        };

        if !within_limit {
            self.audit
                .record(
                    EventKind::RateLimited,
                    client,
                    "Rate limit exceeded",
                    json!({ "query": truncate(question, RATE_LIMIT_QUERY_CHARS) }),
                )
                .await;
            return Verdict::RateLimited;
        }

        if self.filter.is_blocked(question) {
            self.audit
                .record(
                    EventKind::BlockedContent,
                    client,
                    "Harmful query blocked",
                    json!({ "query": truncate(question, LOGGED_QUERY_CHARS) }),
                )
                .await;
            return Verdict::Blocked;
        }

        self.audit
            .record(
                EventKind::Request,
                client,
                "API request",
                json!({ "query": truncate(question, LOGGED_QUERY_CHARS), "llm": llm }),
            )
            .await;
        Verdict::Allowed
    }

    /// Log a provider safety flag for `question`.
    pub async fn flagged(&self, client: &ClientMeta, question: &str, llm: &str) {
        self.audit
            .record(
                EventKind::SafetyFlag,
                client,
                "Provider flagged query as unsafe",
                json!({ "query": truncate(question, LOGGED_QUERY_CHARS), "llm": llm }),
            )
            .await;
    }
}

/// First `max` characters of `text`.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
