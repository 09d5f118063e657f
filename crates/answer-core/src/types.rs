//! Anthropic Messages API wire types.
//!
//! The same logical "source" shows up under several block shapes. Each shape
//! deserializes into a permissive struct and is normalized into [`Source`]
//! by a dedicated helper; anything unrecognized is ignored rather than
//! rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::Source;

/// Block types that announce a web search request.
const SEARCH_USE_BLOCKS: &[&str] = &["server_tool_use", "web_search_tool_use"];

/// Block types that carry search results.
const SEARCH_RESULT_BLOCKS: &[&str] = &["server_tool_result", "web_search_tool_result"];

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the request.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Prompt-cache marker for a system block.
#[derive(Debug, Clone, Serialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// One text block of the system prompt.
#[derive(Debug, Clone, Serialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl SystemBlock {
    /// A block the provider may cache across requests.
    #[must_use]
    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
            cache_control: Some(CacheControl { kind: "ephemeral" }),
        }
    }

    /// A per-request block.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
            cache_control: None,
        }
    }
}

/// Server-side tool declaration (web search).
#[derive(Debug, Clone, Serialize)]
pub struct ServerTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub max_uses: u32,
}

impl ServerTool {
    /// The hosted web search tool.
    #[must_use]
    pub const fn web_search(max_uses: u32) -> Self {
        Self {
            kind: "web_search_20250305",
            name: "web_search",
            max_uses,
        }
    }
}

/// Request to the Messages API.
#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: Vec<SystemBlock>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ServerTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// A citation attached to text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl Citation {
    /// Normalize into a source, if the citation points at a URL.
    #[must_use]
    pub fn to_source(&self) -> Option<Source> {
        let url = self.url.as_deref()?;
        Source::new(url, self.title.as_deref().unwrap_or_default())
    }
}

/// A content block of any kind.
///
/// Fields are optional because each block type uses a different subset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub citations: Option<Vec<Citation>>,
}

impl RawBlock {
    /// Whether this block announces a web search.
    #[must_use]
    pub fn is_search_use(&self) -> bool {
        SEARCH_USE_BLOCKS.contains(&self.kind.as_str())
    }

    /// Whether this block carries web search results.
    #[must_use]
    pub fn is_search_result(&self) -> bool {
        SEARCH_RESULT_BLOCKS.contains(&self.kind.as_str())
    }

    /// Whether this block is a generic tool result.
    #[must_use]
    pub fn is_tool_result(&self) -> bool {
        self.kind == "tool_result" || self.kind == "server_tool_result"
    }

    /// Sources listed in the block's nested `content` array.
    ///
    /// Items are accepted with or without a `web_search_result` type tag, as
    /// long as they carry a `url`.
    #[must_use]
    pub fn result_sources(&self) -> Vec<Source> {
        let Some(items) = self.content.as_array() else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let url = item.get("url")?.as_str()?;
                let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
                Source::new(url, title)
            })
            .collect()
    }

    /// Sources from inline citations on a text block.
    #[must_use]
    pub fn cited_sources(&self) -> Vec<Source> {
        self.citations
            .iter()
            .flatten()
            .filter_map(Citation::to_source)
            .collect()
    }
}

/// Server tool usage counters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerToolUsage {
    #[serde(default)]
    pub web_search_requests: u32,
}

/// Usage block (only the parts this crate reads).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub server_tool_use: Option<ServerToolUsage>,
}

impl Usage {
    /// Number of web searches the provider ran.
    #[must_use]
    pub fn web_search_requests(&self) -> u32 {
        self.server_tool_use
            .as_ref()
            .map_or(0, |u| u.web_search_requests)
    }
}

/// Message start metadata.
#[derive(Debug, Default, Deserialize)]
pub struct MessageStart {
    #[serde(default)]
    pub content: Vec<RawBlock>,
}

/// Delta content in a streaming event.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta {
        text: String,
    },
    CitationsDelta {
        citation: Citation,
    },
    InputJsonDelta {
        #[serde(default)]
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

/// API error payload.
#[derive(Debug, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

/// Streaming event from Anthropic SSE.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(default)]
        message: MessageStart,
    },
    ContentBlockStart {
        #[serde(default)]
        content_block: RawBlock,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    ContentBlockStop,
    MessageDelta {
        #[serde(default)]
        usage: Usage,
    },
    MessageStop,
    Ping,
    Error {
        #[serde(default)]
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

/// Complete (non-streaming) Messages API response.
#[derive(Debug, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<RawBlock>,
    #[serde(default)]
    pub citations: Option<Vec<Citation>>,
    #[serde(default)]
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_event_type_is_not_an_error() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"brand_new_event","x":1}"#).unwrap();
        assert!(matches!(event, StreamEvent::Unknown));
    }

    #[test]
    fn text_delta_parses() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        match event {
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
            } => assert_eq!(text, "Hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_delta_type_maps_to_other() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"thinking_delta","thinking":"..."}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            StreamEvent::ContentBlockDelta {
                delta: Delta::Other
            }
        ));
    }

    #[test]
    fn result_sources_accepts_tagged_and_untagged_items() {
        let block: RawBlock = serde_json::from_value(json!({
            "type": "web_search_tool_result",
            "content": [
                {"type": "web_search_result", "url": "https://a.example", "title": "A"},
                {"url": "https://b.example"},
                {"type": "web_search_result", "title": "no url"}
            ]
        }))
        .unwrap();

        let sources = block.result_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "A");
        assert_eq!(sources[1].url, "https://b.example");
        assert!(sources[1].title.is_empty());
    }

    #[test]
    fn result_sources_ignores_non_array_content() {
        let block: RawBlock = serde_json::from_value(json!({
            "type": "web_search_tool_result",
            "content": {"type": "web_search_tool_result_error", "error_code": "unavailable"}
        }))
        .unwrap();
        assert!(block.result_sources().is_empty());
    }

    #[test]
    fn null_citations_deserialize() {
        let block: RawBlock =
            serde_json::from_value(json!({"type": "text", "text": "x", "citations": null}))
                .unwrap();
        assert!(block.cited_sources().is_empty());
    }

    #[test]
    fn usage_counts_web_searches() {
        let usage: Usage =
            serde_json::from_value(json!({"output_tokens": 5, "server_tool_use": {"web_search_requests": 2}}))
                .unwrap();
        assert_eq!(usage.web_search_requests(), 2);
        assert_eq!(Usage::default().web_search_requests(), 0);
    }

    #[test]
    fn request_omits_stream_when_false() {
        let request = MessagesRequest {
            model: "m".to_string(),
            max_tokens: 10,
            system: vec![SystemBlock::cached("static"), SystemBlock::plain("dynamic")],
            messages: vec![Message::user("q")],
            tools: Some(vec![ServerTool::web_search(3)]),
            temperature: None,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("stream").is_none());
        assert!(value.get("temperature").is_none());
        assert_eq!(value["system"][0]["cache_control"]["type"], "ephemeral");
        assert!(value["system"][1].get("cache_control").is_none());
        assert_eq!(value["tools"][0]["type"], "web_search_20250305");
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
