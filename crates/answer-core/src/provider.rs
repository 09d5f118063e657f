//! Answer provider abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::{AnswerError, Result};
use crate::source::{SourceOrder, SourceSet};
use crate::types::StreamEvent;

/// Two-part system prompt.
///
/// `cached` is identical across requests and may be cached by the provider;
/// `dynamic` carries the per-request context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemPrompt {
    pub cached: String,
    pub dynamic: Option<String>,
}

impl SystemPrompt {
    /// Both parts joined, for providers without prompt caching.
    #[must_use]
    pub fn joined(&self) -> String {
        match &self.dynamic {
            Some(dynamic) if !dynamic.is_empty() => format!("{}\n\n{dynamic}", self.cached),
            _ => self.cached.clone(),
        }
    }
}

/// One question to answer.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub system: SystemPrompt,
    /// The user's question.
    pub question: String,
    /// Sampling temperature, already clamped to the provider's range.
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    /// Enable the provider's hosted web search tool.
    pub web_search: bool,
}

impl CompletionRequest {
    /// Same request with web search turned off.
    #[must_use]
    pub fn without_search(&self) -> Self {
        Self {
            web_search: false,
            ..self.clone()
        }
    }
}

/// A complete, non-streamed answer.
#[derive(Debug, Clone, Default)]
pub struct ProviderAnswer {
    pub text: String,
    pub sources: SourceSet,
    /// Whether the provider reported running a search.
    pub search_used: bool,
}

/// Stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A hosted model that can answer questions.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Short provider name, reported as `llm` in results.
    fn name(&self) -> &'static str;

    /// How sources from [`complete`](Self::complete) should be ranked.
    fn source_order(&self) -> SourceOrder {
        SourceOrder::Encounter
    }

    /// Whether source URLs need fetching to get usable links.
    ///
    /// True for providers that hand out opaque redirect URLs.
    fn resolves_links(&self) -> bool {
        false
    }

    /// Answer in one round trip.
    async fn complete(&self, request: CompletionRequest) -> Result<ProviderAnswer>;

    /// Answer as a stream of events.
    async fn stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let _ = request;
        Err(AnswerError::Unsupported(self.name()))
    }
}
