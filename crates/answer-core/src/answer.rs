//! Final answer payload and the events sent to clients.

use serde::{Deserialize, Serialize};

use crate::followup::extract_followup_questions;
use crate::source::Source;

/// Marker the provider is instructed to put at the start of unsafe answers.
pub const SAFETY_SENTINEL: &str = "[FLAGGED:SAFETY]";

/// Fixed text returned for blocked answers.
pub const BLOCKED_TEXT: &str = "I cannot assist with that request.";

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerMode {
    /// Provider searched the web and returned source metadata.
    WebGrounded,
    /// Search was enabled and text came back, but without source metadata.
    WebFirstNoMetadata,
    /// Answer from model knowledge alone.
    ModelFallback,
    /// Provider flagged the question as unsafe.
    Blocked,
}

/// Terminal result of one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AnswerResult {
    pub mode: AnswerMode,
    pub text: String,
    pub html: String,
    pub markdown_links: Vec<String>,
    /// Source URLs, at most eight.
    pub sources: Vec<String>,
    /// Exactly three entries, except for blocked answers where it is empty.
    pub followup_questions: Vec<String>,
    /// Provider that produced the answer.
    pub llm: String,
}

impl AnswerResult {
    /// Assemble a result from answer text and the already-selected sources.
    #[must_use]
    pub fn new(mode: AnswerMode, text: String, sources: &[Source], llm: &str) -> Self {
        Self::with_links(
            mode,
            text,
            sources.iter().map(|s| s.url.clone()).collect(),
            sources.iter().map(Source::markdown).collect(),
            llm,
        )
    }

    /// Assemble a result whose markdown links were resolved elsewhere.
    #[must_use]
    pub fn with_links(
        mode: AnswerMode,
        text: String,
        sources: Vec<String>,
        markdown_links: Vec<String>,
        llm: &str,
    ) -> Self {
        Self {
            mode,
            html: render_html(&text),
            followup_questions: extract_followup_questions(&text),
            text,
            markdown_links,
            sources,
            llm: llm.to_string(),
        }
    }

    /// The refusal returned when a question is flagged.
    #[must_use]
    pub fn blocked(llm: &str) -> Self {
        Self {
            mode: AnswerMode::Blocked,
            text: BLOCKED_TEXT.to_string(),
            html: BLOCKED_TEXT.to_string(),
            markdown_links: Vec::new(),
            sources: Vec::new(),
            followup_questions: Vec::new(),
            llm: llm.to_string(),
        }
    }
}

/// Whether the provider marked its answer as unsafe.
#[must_use]
pub fn is_flagged(text: &str) -> bool {
    text.trim_start().starts_with(SAFETY_SENTINEL)
}

/// Escape text for HTML and turn newlines into `<br />` breaks.
#[must_use]
pub fn render_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            '\n' => out.push_str("<br />\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Event delivered to the client over SSE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Incremental answer text.
    Text { text: String },
    /// Final result; nothing follows it.
    Done(AnswerResult),
    /// Stream-level failure; nothing follows it.
    Error { error: String },
}

impl ClientEvent {
    /// Whether the stream ends after this event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error { .. })
    }
}
