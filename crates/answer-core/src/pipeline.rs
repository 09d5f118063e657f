//! Two-phase answer pipeline for non-streamed requests.
//!
//! The first call has web search enabled. If it fails or comes back empty,
//! a single retry runs with search disabled. There is no further retry.

use crate::answer::{AnswerMode, AnswerResult, is_flagged};
use crate::citation::CitationResolver;
use crate::error::{AnswerError, Result};
use crate::provider::{AnswerProvider, CompletionRequest, ProviderAnswer};
use crate::source::MAX_SOURCES;

/// Outcome of a single provider call.
#[derive(Debug)]
pub enum Attempt {
    /// Non-empty text came back.
    Answered(ProviderAnswer),
    /// The call succeeded but produced no text.
    Empty,
    /// Transport failure, error status, timeout or malformed body.
    Failed(AnswerError),
}

/// Make one call and classify the outcome.
pub async fn attempt(provider: &dyn AnswerProvider, request: CompletionRequest) -> Attempt {
    match provider.complete(request).await {
        Ok(answer) if answer.text.trim().is_empty() => Attempt::Empty,
        Ok(answer) => Attempt::Answered(answer),
        Err(e) => Attempt::Failed(e),
    }
}

/// Answer a question, falling back to a model-only call if the search-first
/// call yields nothing usable.
///
/// `resolver` is used for providers whose source URLs need fetching; without
/// one, links are titled from what the provider returned.
///
/// # Errors
///
/// Returns the fallback call's error when both calls fail, or
/// [`AnswerError::EmptyResponse`] when the fallback comes back empty.
pub async fn answer_with_fallback(
    provider: &dyn AnswerProvider,
    request: &CompletionRequest,
    resolver: Option<&CitationResolver>,
) -> Result<AnswerResult> {
    let llm = provider.name();
    let search_first = CompletionRequest {
        web_search: true,
        ..request.clone()
    };

    match attempt(provider, search_first).await {
        Attempt::Answered(answer) => {
            if is_flagged(&answer.text) {
                return Ok(AnswerResult::blocked(llm));
            }
            return Ok(grounded(provider, answer, resolver).await);
        }
        Attempt::Empty => {
            tracing::warn!(provider = llm, "search-first call returned no text, retrying without search");
        }
        Attempt::Failed(e) => {
            tracing::warn!(provider = llm, error = %e, "search-first call failed, retrying without search");
        }
    }

    match attempt(provider, request.without_search()).await {
        Attempt::Answered(answer) if is_flagged(&answer.text) => Ok(AnswerResult::blocked(llm)),
        Attempt::Answered(answer) => Ok(AnswerResult::new(
            AnswerMode::ModelFallback,
            answer.text,
            &[],
            llm,
        )),
        Attempt::Empty => Err(AnswerError::EmptyResponse),
        Attempt::Failed(e) => {
            tracing::error!(provider = llm, error = %e, "fallback call failed");
            Err(e)
        }
    }
}

async fn grounded(
    provider: &dyn AnswerProvider,
    answer: ProviderAnswer,
    resolver: Option<&CitationResolver>,
) -> AnswerResult {
    let llm = provider.name();
    let mode = if answer.search_used || !answer.sources.is_empty() {
        AnswerMode::WebGrounded
    } else {
        AnswerMode::WebFirstNoMetadata
    };
    let picked = answer.sources.select(provider.source_order(), MAX_SOURCES);

    match resolver.filter(|_| provider.resolves_links()) {
        Some(resolver) => {
            let urls: Vec<&str> = picked.iter().map(|s| s.url.as_str()).collect();
            let links = resolver.resolve_all(&urls).await;
            AnswerResult::with_links(
                mode,
                answer.text,
                links.iter().map(|l| l.url.clone()).collect(),
                links.into_iter().map(|l| l.markdown).collect(),
                llm,
            )
        }
        None => AnswerResult::new(mode, answer.text, &picked, llm),
    }
}
