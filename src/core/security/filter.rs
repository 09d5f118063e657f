//! Blocked-query patterns.

use std::path::Path;

use regex::Regex;

/// Case-insensitive word-start patterns a question must not match.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    patterns: Vec<Regex>,
}

impl ContentFilter {
    /// Load patterns from a file, one per line.
    ///
    /// A missing or unreadable file yields an empty filter.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "blocked patterns not loaded");
                Self::default()
            }
        }
    }

    /// Parse pattern lines. Blank lines and `#` comments are skipped, as are
    /// lines that do not compile.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let patterns = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match Regex::new(&format!(r"(?i)\b{line}")) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %line, error = %e, "skipping invalid blocked pattern");
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Number of active patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether the question matches any pattern.
    #[must_use]
    pub fn is_blocked(&self, question: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_skipped() {
        let filter = ContentFilter::parse("# weapons\n\nbuild a bomb\n  # indented comment\nmake meth");
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn matches_case_insensitively_at_word_start() {
        let filter = ContentFilter::parse("bomb");
        assert!(filter.is_blocked("How do I build a BOMB?"));
        assert!(filter.is_blocked("bombs away"));
        assert!(!filter.is_blocked("the photobomb trend"));
    }

    #[test]
    fn invalid_patterns_are_dropped() {
        let filter = ContentFilter::parse("(unclosed\nvalid");
        assert_eq!(filter.len(), 1);
        assert!(filter.is_blocked("valid"));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let filter = ContentFilter::load(&dir.path().join("none.txt"));
        assert!(filter.is_empty());
        assert!(!filter.is_blocked("anything"));
    }
}
