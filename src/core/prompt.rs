//! Prompt templates and request shaping for both providers.

use answer_core::{CompletionRequest, SystemPrompt};

/// Token budget for podcast answers, regardless of expertise.
pub const PODCAST_MAX_TOKENS: u32 = 1500;

/// Default sampling temperature for both providers.
pub const DEFAULT_TEMPERATURE: f64 = 0.4;

const STANDARD_PROMPT: &str = "\
You are a knowledgeable, direct subject-matter expert.

TONE: State claims directly with analytical confidence. This is analytical framing, not advocacy. Hedging is acceptable ONLY when presenting genuinely contested evidence, not as a stylistic default.

BANNED PATTERNS: Do not use any of the following:
- 'it could be argued', 'some might say', 'potentially', 'arguably'
- 'can be seen as', 'while [concession]' clauses that soften a point before making it
- 'at the expense of', 'suggests a strategic decision'

Do not restate the question or add a preamble. Do not add a closing summary paragraph.

ANSWER PRECISION: When a question asks you to 'name', 'identify', or 'list' specific moments, instances, or examples, cite specific dated events involving specific named people, not ongoing trends, general strategies, or multi-year patterns. Each point must be a distinct, identifiable moment in time.

RECENCY: Always prioritize the most current and up-to-date information available. When discussing facts, statistics, policies, or events, use the latest data from 2024-2026 whenever possible.

LANGUAGE: If the user's message begins with 'Please respond in [language]', you MUST write your ENTIRE response in that language, including the follow-up questions.

IMPORTANT: At the end of every answer, you MUST provide exactly 3 contextual follow-up questions that help the user explore the topic deeper. Format them clearly as:

Follow-up questions:
1. [First question]
2. [Second question]
3. [Third question]";

const PODCAST_PROMPT: &str = "\
You are a confident expert being interviewed for a podcast. Write conversationally for SPOKEN DELIVERY.

TONE: State claims directly with analytical confidence. Hedging is acceptable ONLY when presenting genuinely contested evidence.

STYLE: Write as if you are speaking to an interviewer. Use natural, flowing sentences. Avoid bullet points, numbered lists, and markdown formatting. Do not use asterisks, headers, or special characters. Keep answers brief and punchy - aim for 2 short paragraphs, under 120 words total. Use verbal transitions like 'Well,', 'So,', 'The thing is,' etc.

BANNED PATTERNS: Do not use 'it could be argued', 'some might say', 'potentially', 'arguably', 'can be seen as'.

RECENCY: Prioritize current information from 2024-2026 when relevant.

LANGUAGE: If the user's message begins with 'Please respond in [language]', respond entirely in that language.

IMPORTANT: At the end of every answer, provide exactly 3 follow-up questions the interviewer might ask. Format them as:

Follow-up questions:
1. [First question]
2. [Second question]
3. [Third question]";

const QUAREX_DEFINITION: &str = "IMPORTANT CONTEXT - Quarex Definition: A quarex is a dynamically generated, recursively structured knowledge artifact that evolves through iterative inquiry. It is a new medium for organizing knowledge, neither a traditional book nor a dataset, but a living system that reorganizes itself as new questions emerge. See quarex.org for more.";

const QUAREX_PRINCIPLES: &str = " Key principles: (1) Living Evolution - continuously grows based on new inquiries, (2) Flexible Navigation - users can enter at any point without losing coherence, (3) Guided Expansion - AI generates content while human architects maintain creative control, (4) Exploration-Focused - designed for deep inquiry rather than linear consumption. Quarex represents a post-book paradigm for knowledge organization.";

const GEMINI_PREAMBLE: &str = "You are an expert academic assistant. Write at a clear 12th-grade level. \
RECENCY: Always prioritize the most current and up-to-date information available. When discussing facts, statistics, \
policies, or events, use the latest data from 2024-2025 whenever possible. If information may have changed recently, \
explicitly note the date or timeframe of your sources. Avoid presenting outdated information as current. \
LANGUAGE: If the user's message begins with 'Please respond in [language]', you MUST write your ENTIRE response \
in that language, including the follow-up questions. This applies to all languages including Japanese (日本語), \
Korean (한국어), Simplified Chinese (简体中文), Traditional Chinese (繁體中文), and all others. ";

const GEMINI_CLOSING: &str = "SAFETY: If a query requests information about illegal activities, violence, exploitation, self-harm, \
or other harmful content, begin your response with exactly [FLAGGED:SAFETY] followed by a polite \
refusal explaining you cannot assist with that topic. \
IMPORTANT: At the end of every answer, you MUST provide exactly 3 contextual follow-up questions \
that help the user explore the topic deeper. Format them clearly as:\n\n\
Follow-up questions:\n1. [First question]\n2. [Second question]\n3. [Third question]";

/// Reader level an answer is pitched at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expertise {
    Introductory,
    #[default]
    Intermediate,
    Advanced,
}

impl Expertise {
    /// Parse a request value; anything unrecognized is intermediate.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "introductory" => Self::Introductory,
            "advanced" => Self::Advanced,
            _ => Self::Intermediate,
        }
    }

    /// Answer token budget for this level.
    #[must_use]
    pub const fn max_tokens(self) -> u32 {
        match self {
            Self::Introductory => 2048,
            Self::Intermediate => 3072,
            Self::Advanced => 4096,
        }
    }

    const fn instructions(self) -> &'static str {
        match self {
            Self::Introductory => {
                "EXPERTISE LEVEL: Introductory. Write for someone new to this topic. Use plain language. If you must use a technical term, explain it briefly in parentheses. Use concrete examples from everyday life. Keep each numbered point to 3-4 sentences maximum. Be the shortest of all levels. Each point must name a specific person, event, or date."
            }
            Self::Intermediate => {
                "EXPERTISE LEVEL: Intermediate. Write for an educated general audience. Explain technical terms briefly when first used. Balance accessibility with substance. Keep each numbered point to 4-5 sentences. Must be shorter than Advanced but more detailed than Introductory. Each point must name specific people and dates."
            }
            Self::Advanced => {
                "EXPERTISE LEVEL: Advanced. Write for a knowledgeable, professional audience. Use technical terminology freely. Cite specific events, names, dates, and data points in every point. Include counter-arguments and competing interpretations where they add substance. Present these as separate observations, not as 'while' clauses cushioning the main claim. Keep each numbered point to 5-6 sentences maximum. Prioritize density over length."
            }
        }
    }
}

/// Per-request options for the Claude endpoint.
#[derive(Debug, Clone)]
pub struct ClaudeOptions {
    pub category: String,
    pub expertise: Expertise,
    pub podcast: bool,
    /// Already clamped to 0..=1.
    pub temperature: f64,
}

impl Default for ClaudeOptions {
    fn default() -> Self {
        Self {
            category: String::new(),
            expertise: Expertise::default(),
            podcast: false,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Per-request options for the Gemini endpoint.
#[derive(Debug, Clone)]
pub struct GeminiOptions {
    pub category: String,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl Default for GeminiOptions {
    fn default() -> Self {
        Self {
            category: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 8000,
        }
    }
}

impl GeminiOptions {
    /// Build from raw request values, clamping each into range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_raw(
        category: String,
        temperature: Option<f64>,
        top_p: Option<f64>,
        top_k: Option<f64>,
        max_tokens: Option<f64>,
    ) -> Self {
        Self {
            category,
            temperature: clamp(temperature, 0.0, 2.0, DEFAULT_TEMPERATURE),
            top_p: clamp(top_p, 0.0, 1.0, 0.9),
            // Clamped to small positive ranges, so the casts are exact.
            top_k: clamp(top_k, 1.0, 100.0, 40.0) as u32,
            max_tokens: clamp(max_tokens, 64.0, 20_000.0, 8000.0) as u32,
        }
    }
}

/// Clamp an optional number into `[min, max]`, using `default` when absent.
#[must_use]
pub fn clamp(value: Option<f64>, min: f64, max: f64, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => default,
    }
}

fn mentions_quarex(category: &str) -> bool {
    category.to_lowercase().contains("quarex")
}

/// Two-part Claude system prompt: a cacheable static block and the
/// per-request context.
#[must_use]
pub fn claude_system(options: &ClaudeOptions) -> SystemPrompt {
    let cached = if options.podcast {
        PODCAST_PROMPT
    } else {
        STANDARD_PROMPT
    };

    let mut dynamic = vec![options.expertise.instructions().to_string()];
    let category = options.category.trim();
    if mentions_quarex(category) {
        dynamic.push(QUAREX_DEFINITION.to_string());
    }
    if !category.is_empty() {
        dynamic.push(format!(
            "This question is in the context of: {category}. Provide answers relevant to this subject area."
        ));
    }

    SystemPrompt {
        cached: cached.to_string(),
        dynamic: Some(dynamic.join("\n\n")),
    }
}

/// Claude answer token budget.
#[must_use]
pub const fn claude_max_tokens(options: &ClaudeOptions) -> u32 {
    if options.podcast {
        PODCAST_MAX_TOKENS
    } else {
        options.expertise.max_tokens()
    }
}

/// Gemini system instruction as a single block.
#[must_use]
pub fn gemini_system(category: &str) -> SystemPrompt {
    let category = category.trim();
    let mut text = GEMINI_PREAMBLE.to_string();
    if mentions_quarex(category) {
        text.push_str(QUAREX_DEFINITION);
        text.push_str(QUAREX_PRINCIPLES);
        text.push(' ');
    }
    if !category.is_empty() {
        text.push_str(&format!(
            "This question is in the context of: {category}. Provide answers relevant to this subject area. "
        ));
    }
    text.push_str(GEMINI_CLOSING);

    SystemPrompt {
        cached: text,
        dynamic: None,
    }
}

/// Search-enabled Claude request.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn claude_request(model: &str, question: &str, options: &ClaudeOptions) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        max_tokens: claude_max_tokens(options),
        system: claude_system(options),
        question: question.to_string(),
        temperature: Some(options.temperature as f32),
        top_p: None,
        top_k: None,
        web_search: true,
    }
}

/// Search-enabled Gemini request.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn gemini_request(model: &str, question: &str, options: &GeminiOptions) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        max_tokens: options.max_tokens,
        system: gemini_system(&options.category),
        question: question.to_string(),
        temperature: Some(options.temperature as f32),
        top_p: Some(options.top_p as f32),
        top_k: Some(options.top_k),
        web_search: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expertise_parse_defaults_to_intermediate() {
        assert_eq!(Expertise::parse("advanced"), Expertise::Advanced);
        assert_eq!(Expertise::parse(" introductory "), Expertise::Introductory);
        assert_eq!(Expertise::parse("expert"), Expertise::Intermediate);
        assert_eq!(Expertise::parse(""), Expertise::Intermediate);
    }

    #[test]
    fn max_tokens_follow_mode() {
        let mut options = ClaudeOptions::default();
        assert_eq!(claude_max_tokens(&options), 3072);
        options.expertise = Expertise::Introductory;
        assert_eq!(claude_max_tokens(&options), 2048);
        options.expertise = Expertise::Advanced;
        assert_eq!(claude_max_tokens(&options), 4096);
        options.podcast = true;
        assert_eq!(claude_max_tokens(&options), PODCAST_MAX_TOKENS);
    }

    #[test]
    fn clamp_handles_missing_and_out_of_range() {
        assert!((clamp(None, 0.0, 1.0, 0.4) - 0.4).abs() < f64::EPSILON);
        assert!((clamp(Some(3.0), 0.0, 1.0, 0.4) - 1.0).abs() < f64::EPSILON);
        assert!((clamp(Some(-1.0), 0.0, 1.0, 0.4)).abs() < f64::EPSILON);
        assert!((clamp(Some(f64::NAN), 0.0, 1.0, 0.4) - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn gemini_options_clamp_each_knob() {
        let options = GeminiOptions::from_raw(String::new(), Some(5.0), None, Some(0.0), Some(1e9));
        assert!((options.temperature - 2.0).abs() < f64::EPSILON);
        assert!((options.top_p - 0.9).abs() < f64::EPSILON);
        assert_eq!(options.top_k, 1);
        assert_eq!(options.max_tokens, 20_000);
    }

    #[test]
    fn claude_dynamic_block_carries_context() {
        let options = ClaudeOptions {
            category: "Quarex Studies".to_string(),
            ..ClaudeOptions::default()
        };
        let system = claude_system(&options);
        assert!(system.cached.starts_with("You are a knowledgeable"));
        let dynamic = system.dynamic.unwrap();
        assert!(dynamic.starts_with("EXPERTISE LEVEL: Intermediate"));
        assert!(dynamic.contains("Quarex Definition"));
        assert!(dynamic.ends_with("context of: Quarex Studies. Provide answers relevant to this subject area."));
    }

    #[test]
    fn podcast_uses_spoken_prompt() {
        let options = ClaudeOptions {
            podcast: true,
            ..ClaudeOptions::default()
        };
        let system = claude_system(&options);
        assert!(system.cached.contains("SPOKEN DELIVERY"));
        assert!(!system.dynamic.unwrap().contains("Quarex"));
    }

    #[test]
    fn gemini_system_includes_safety_and_format() {
        let system = gemini_system("History");
        assert!(system.cached.contains("[FLAGGED:SAFETY]"));
        assert!(system.cached.contains("context of: History."));
        assert!(system.cached.ends_with("3. [Third question]"));
        assert!(system.dynamic.is_none());
    }

    #[test]
    fn requests_enable_search() {
        let request = claude_request("m", "q", &ClaudeOptions::default());
        assert!(request.web_search);
        assert_eq!(request.max_tokens, 3072);

        let request = gemini_request("g", "q", &GeminiOptions::default());
        assert_eq!(request.top_k, Some(40));
        assert_eq!(request.max_tokens, 8000);
    }
}
