//! Streaming answer aggregation.
//!
//! [`AggregationState`] is owned by one request. Provider events are applied
//! in order; text is forwarded as it arrives and the final result is built
//! once `message_stop` is seen.

use futures::{Stream, StreamExt};

use crate::answer::{AnswerMode, AnswerResult, ClientEvent, is_flagged};
use crate::error::Result;
use crate::source::{MAX_SOURCES, SourceOrder, SourceSet};
use crate::sse;
use crate::types::{Delta, StreamEvent};

/// Error sent when the provider stream closes without `message_stop`.
pub const TRUNCATED_STREAM: &str = "stream ended before message_stop";

/// Accumulated state of one streamed answer.
#[derive(Debug, Clone)]
pub struct AggregationState {
    full_text: String,
    sources: SourceSet,
    search_used: bool,
    current_block_type: Option<String>,
    llm: String,
}

impl AggregationState {
    /// Start aggregating an answer from the named provider.
    #[must_use]
    pub fn new(llm: impl Into<String>) -> Self {
        Self {
            full_text: String::new(),
            sources: SourceSet::new(),
            search_used: false,
            current_block_type: None,
            llm: llm.into(),
        }
    }

    /// Text received so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.full_text
    }

    /// Sources collected so far, in encounter order.
    #[must_use]
    pub const fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Whether any event signalled that web search ran.
    #[must_use]
    pub const fn search_used(&self) -> bool {
        self.search_used
    }

    /// Type of the content block currently open.
    #[must_use]
    pub fn current_block_type(&self) -> Option<&str> {
        self.current_block_type.as_deref()
    }

    /// Apply one provider event.
    ///
    /// Returns the event to forward to the client, if any. A `done` or
    /// `error` return is terminal.
    pub fn apply(&mut self, event: StreamEvent) -> Option<ClientEvent> {
        match event {
            StreamEvent::MessageStart { message } => {
                for block in message.content.iter().filter(|b| b.is_tool_result()) {
                    self.sources.extend(block.result_sources());
                }
                None
            }

            StreamEvent::ContentBlockStart { content_block } => {
                if content_block.is_search_use() {
                    self.search_used = true;
                }
                if content_block.is_search_result() {
                    self.sources.extend(content_block.result_sources());
                }
                for source in content_block.cited_sources() {
                    self.sources.cite(source);
                    self.search_used = true;
                }
                self.current_block_type = Some(content_block.kind);
                None
            }

            StreamEvent::ContentBlockDelta { delta } => match delta {
                Delta::TextDelta { text } => {
                    self.full_text.push_str(&text);
                    Some(ClientEvent::Text { text })
                }
                Delta::CitationsDelta { citation } => {
                    if let Some(source) = citation.to_source() {
                        self.sources.cite(source);
                        self.search_used = true;
                    }
                    None
                }
                Delta::InputJsonDelta { .. } | Delta::Other => None,
            },

            StreamEvent::ContentBlockStop => {
                self.current_block_type = None;
                None
            }

            StreamEvent::MessageDelta { usage } => {
                if usage.web_search_requests() > 0 {
                    self.search_used = true;
                }
                None
            }

            StreamEvent::MessageStop => Some(ClientEvent::Done(self.finalize())),

            StreamEvent::Error { error } => {
                let error = if error.message.is_empty() {
                    "provider reported an error".to_string()
                } else {
                    error.message
                };
                Some(ClientEvent::Error { error })
            }

            StreamEvent::Ping | StreamEvent::Unknown => None,
        }
    }

    /// Parse one SSE line and apply it.
    pub fn feed_line(&mut self, line: &str) -> Option<ClientEvent> {
        sse::parse_line(line).and_then(|event| self.apply(event))
    }

    /// Build the final result from the current state.
    ///
    /// Does not mutate anything, so calling it twice yields the same result.
    #[must_use]
    pub fn finalize(&self) -> AnswerResult {
        if is_flagged(&self.full_text) {
            return AnswerResult::blocked(&self.llm);
        }

        let mode = if self.search_used {
            AnswerMode::WebGrounded
        } else {
            AnswerMode::ModelFallback
        };
        let picked = self.sources.select(SourceOrder::Encounter, MAX_SOURCES);
        AnswerResult::new(mode, self.full_text.clone(), &picked, &self.llm)
    }
}

/// Turn a provider event stream into client events.
///
/// The output always ends with exactly one terminal event: `done` on
/// `message_stop`, or `error` on a provider error, a transport failure, or a
/// stream that closes early.
pub fn aggregate<S>(events: S, llm: impl Into<String>) -> impl Stream<Item = ClientEvent>
where
    S: Stream<Item = Result<StreamEvent>> + Send,
{
    let mut state = AggregationState::new(llm);

    async_stream::stream! {
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "provider stream failed");
                    yield ClientEvent::Error { error: e.client_message() };
                    return;
                }
            };

            if let Some(out) = state.apply(event) {
                let terminal = out.is_terminal();
                yield out;
                if terminal {
                    return;
                }
            }
        }

        yield ClientEvent::Error { error: TRUNCATED_STREAM.to_string() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnswerError;
    use futures::stream;

    fn event(json: &str) -> StreamEvent {
        serde_json::from_str(json).unwrap()
    }

    fn text(t: &str) -> StreamEvent {
        event(&format!(
            r#"{{"type":"content_block_delta","index":0,"delta":{{"type":"text_delta","text":{}}}}}"#,
            serde_json::to_string(t).unwrap()
        ))
    }

    fn citation(url: &str, title: &str) -> StreamEvent {
        event(&format!(
            r#"{{"type":"content_block_delta","index":1,"delta":{{"type":"citations_delta","citation":{{"type":"web_search_result_location","url":"{url}","title":"{title}"}}}}}}"#
        ))
    }

    fn stop() -> StreamEvent {
        event(r#"{"type":"message_stop"}"#)
    }

    fn done(out: Option<ClientEvent>) -> AnswerResult {
        match out {
            Some(ClientEvent::Done(result)) => result,
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_forwarded_then_done() {
        let mut state = AggregationState::new("claude");
        assert_eq!(
            state.apply(text("Hello ")),
            Some(ClientEvent::Text {
                text: "Hello ".to_string()
            })
        );
        assert_eq!(
            state.apply(text("world.")),
            Some(ClientEvent::Text {
                text: "world.".to_string()
            })
        );

        let result = done(state.apply(stop()));
        assert_eq!(result.mode, AnswerMode::ModelFallback);
        assert_eq!(result.text, "Hello world.");
        assert!(result.sources.is_empty());
        assert!(result.markdown_links.is_empty());
        assert_eq!(result.followup_questions, ["", "", ""]);
    }

    #[test]
    fn tool_result_then_citation_dedups() {
        let mut state = AggregationState::new("claude");
        state.apply(event(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"server_tool_use","id":"s1","name":"web_search","input":{}}}"#,
        ));
        assert!(state.search_used());
        assert_eq!(state.current_block_type(), Some("server_tool_use"));

        state.apply(event(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"web_search_tool_result","tool_use_id":"s1","content":[{"type":"web_search_result","url":"https://a.example/x","title":"A"},{"type":"web_search_result","url":"https://b.example","title":"B"}]}}"#,
        ));
        state.apply(citation("https://a.example/x", "A (cited)"));

        let result = done(state.apply(stop()));
        assert_eq!(result.mode, AnswerMode::WebGrounded);
        assert_eq!(result.sources, ["https://a.example/x", "https://b.example"]);
        assert_eq!(
            result.markdown_links,
            ["[A (cited)](https://a.example/x)", "[B](https://b.example)"]
        );
    }

    #[test]
    fn citation_alone_means_web_grounded() {
        let mut state = AggregationState::new("claude");
        state.apply(text("Fact."));
        state.apply(citation("https://c.example/page", ""));
        let result = done(state.apply(stop()));
        assert_eq!(result.mode, AnswerMode::WebGrounded);
        assert_eq!(result.markdown_links, ["[c.example](https://c.example/page)"]);
    }

    #[test]
    fn message_start_tool_results_are_collected() {
        let mut state = AggregationState::new("claude");
        state.apply(event(
            r#"{"type":"message_start","message":{"id":"m","content":[{"type":"tool_result","content":[{"url":"https://d.example","title":"D"}]},{"type":"text","text":""}]}}"#,
        ));
        assert!(state.sources().contains("https://d.example"));
        assert!(!state.search_used());
    }

    #[test]
    fn usage_signals_search() {
        let mut state = AggregationState::new("claude");
        state.apply(event(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":3,"server_tool_use":{"web_search_requests":1}}}"#,
        ));
        assert!(state.search_used());
        assert_eq!(done(state.apply(stop())).mode, AnswerMode::WebGrounded);
    }

    #[test]
    fn sources_capped_at_eight() {
        let mut state = AggregationState::new("claude");
        for i in 0..12 {
            state.apply(citation(&format!("https://s{i}.example"), "t"));
        }
        let result = done(state.apply(stop()));
        assert_eq!(result.sources.len(), MAX_SOURCES);
        assert_eq!(result.markdown_links.len(), MAX_SOURCES);
        assert_eq!(result.sources[0], "https://s0.example");
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut state = AggregationState::new("claude");
        state.apply(text("Answer.\n\nFollow-up questions:\n1. A?\n2. B?\n3. C?"));
        state.apply(citation("https://e.example", "E"));
        let first = serde_json::to_string(&state.finalize()).unwrap();
        let second = serde_json::to_string(&state.finalize()).unwrap();
        assert_eq!(first, second);
        assert_eq!(state.finalize().followup_questions, ["A?", "B?", "C?"]);
    }

    #[test]
    fn flagged_text_is_blocked() {
        let mut state = AggregationState::new("claude");
        state.apply(text("[FLAGGED:SAFETY] no"));
        state.apply(citation("https://f.example", "F"));
        let result = done(state.apply(stop()));
        assert_eq!(result.mode, AnswerMode::Blocked);
        assert!(result.sources.is_empty());
        assert!(result.followup_questions.is_empty());
    }

    #[test]
    fn unknown_and_control_lines_are_ignored() {
        let mut state = AggregationState::new("claude");
        assert!(state.feed_line("event: content_block_delta").is_none());
        assert!(state.feed_line("data: {\"type\":\"ping\"}").is_none());
        assert!(state.feed_line("data: {\"type\":\"brand_new\"}").is_none());
        assert!(state.feed_line("data: [DONE]").is_none());
        assert!(state.feed_line("data: {broken").is_none());
        assert!(matches!(
            state.feed_line(r#"data: {"type":"message_stop"}"#),
            Some(ClientEvent::Done(_))
        ));
    }

    #[test]
    fn provider_error_event_is_terminal() {
        let mut state = AggregationState::new("claude");
        let out = state.apply(event(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ));
        assert_eq!(
            out,
            Some(ClientEvent::Error {
                error: "Overloaded".to_string()
            })
        );
    }

    #[tokio::test]
    async fn aggregate_emits_chunks_then_single_done() {
        let events = stream::iter(vec![Ok(text("Hello ")), Ok(text("world.")), Ok(stop())]);
        let out: Vec<ClientEvent> = aggregate(events, "claude").collect().await;

        assert_eq!(out.len(), 3);
        assert!(matches!(&out[0], ClientEvent::Text { text } if text == "Hello "));
        assert!(matches!(&out[1], ClientEvent::Text { text } if text == "world."));
        match &out[2] {
            ClientEvent::Done(result) => {
                assert_eq!(result.mode, AnswerMode::ModelFallback);
                assert!(result.sources.is_empty());
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn aggregate_stops_after_done() {
        let events = stream::iter(vec![Ok(stop()), Ok(text("late"))]);
        let out: Vec<ClientEvent> = aggregate(events, "claude").collect().await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn aggregate_reports_transport_failure() {
        let events = stream::iter(vec![
            Ok(text("partial")),
            Err(AnswerError::Stream("connection reset".to_string())),
        ]);
        let out: Vec<ClientEvent> = aggregate(events, "claude").collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], ClientEvent::Error { error } if error.contains("connection reset")));
    }

    #[tokio::test]
    async fn aggregate_keeps_provider_body_out_of_error_event() {
        let events = stream::iter(vec![Err(AnswerError::Api {
            status: 500,
            message: "<html>stack trace</html>".repeat(150),
        })]);
        let out: Vec<ClientEvent> = aggregate(events, "claude").collect().await;
        assert_eq!(
            out,
            [ClientEvent::Error {
                error: "API error (HTTP 500)".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn aggregate_reports_truncated_stream() {
        let events = stream::iter(vec![Ok(text("partial"))]);
        let out: Vec<ClientEvent> = aggregate(events, "claude").collect().await;
        assert_eq!(
            out.last(),
            Some(&ClientEvent::Error {
                error: TRUNCATED_STREAM.to_string()
            })
        );
    }
}
