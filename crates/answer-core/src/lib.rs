//! Answer aggregation library for Quarex.
//!
//! Talks to hosted models, folds their streamed events into a final answer
//! with deduplicated sources, and titles citation links.

pub mod aggregate;
pub mod answer;
pub mod citation;
pub mod error;
pub mod followup;
pub mod pipeline;
pub mod provider;
pub mod providers;
pub mod source;
pub mod sse;
pub mod types;

pub use aggregate::{AggregationState, aggregate};
pub use answer::{AnswerMode, AnswerResult, ClientEvent};
pub use citation::{CitationResolver, ResolvedLink};
pub use error::{AnswerError, Result};
pub use pipeline::answer_with_fallback;
pub use provider::{AnswerProvider, CompletionRequest, SystemPrompt};
