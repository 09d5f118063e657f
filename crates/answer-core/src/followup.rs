//! Follow-up question extraction.

use std::sync::LazyLock;

use regex::Regex;

/// Number of follow-up questions every answer carries.
pub const FOLLOWUP_COUNT: usize = 3;

static SECTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)Follow-up questions?:?\s*(.*?)(?:\n\n|$)").ok());
static ITEM_START: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+\.\s*").ok());
static ITEM_BREAK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n\d+\.").ok());

/// Pull the numbered follow-up questions out of an answer.
///
/// Always returns exactly [`FOLLOWUP_COUNT`] entries: extra questions are
/// dropped and missing ones are empty strings.
#[must_use]
pub fn extract_followup_questions(text: &str) -> Vec<String> {
    let mut questions = numbered_items(text);
    questions.truncate(FOLLOWUP_COUNT);
    questions.resize(FOLLOWUP_COUNT, String::new());
    questions
}

fn numbered_items(text: &str) -> Vec<String> {
    let (Some(section_re), Some(start_re), Some(break_re)) =
        (SECTION.as_ref(), ITEM_START.as_ref(), ITEM_BREAK.as_ref())
    else {
        return Vec::new();
    };

    let Some(section) = section_re.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    let mut rest = section.as_str();
    while let Some(start) = start_re.find(rest) {
        let body = &rest[start.end()..];
        let end = break_re.find(body).map_or(body.len(), |m| m.start());
        let item = body[..end].trim();
        if !item.is_empty() {
            items.push(item.to_string());
        }
        rest = &body[end..];
    }
    items
}
