//! Source records and the deduplicating set that collects them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maximum number of sources attached to an answer.
pub const MAX_SOURCES: usize = 8;

/// A URL the provider associated with its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl Source {
    /// Build a source, trimming the URL.
    ///
    /// Returns `None` for an empty URL.
    #[must_use]
    pub fn new(url: &str, title: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        Some(Self {
            url: url.to_string(),
            title: title.trim().to_string(),
        })
    }

    /// Title to display, falling back to the URL's hostname.
    #[must_use]
    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            host_of(&self.url).unwrap_or_else(|| self.url.clone())
        } else {
            self.title.clone()
        }
    }

    /// Markdown link `[title](url)`.
    #[must_use]
    pub fn markdown(&self) -> String {
        format!("[{}]({})", self.display_title(), self.url)
    }
}

/// Hostname of a URL, if it parses.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(ToString::to_string)
}

/// How the first N sources are chosen.
///
/// The streaming and non-streaming paths have always differed here, so both
/// policies are kept by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceOrder {
    /// First N in encounter order.
    #[default]
    Encounter,
    /// Cited sources first (encounter order), then searched-only ones.
    CitedFirst,
}

#[derive(Debug, Clone)]
struct Entry {
    source: Source,
    cited: bool,
}

/// Sources keyed by URL, remembering first-encounter order.
///
/// Re-inserting a URL overwrites its title but keeps its position.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl SourceSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a search-result source.
    pub fn insert(&mut self, source: Source) {
        self.upsert(source, false);
    }

    /// Insert or overwrite a source the answer text cites.
    pub fn cite(&mut self, source: Source) {
        self.upsert(source, true);
    }

    fn upsert(&mut self, source: Source, cited: bool) {
        if let Some(&i) = self.index.get(&source.url) {
            let entry = &mut self.entries[i];
            entry.source.title = source.title;
            entry.cited |= cited;
        } else {
            self.index.insert(source.url.clone(), self.entries.len());
            self.entries.push(Entry { source, cited });
        }
    }

    /// Number of distinct URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no source has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the URL is present.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url.trim())
    }

    /// Iterate sources in encounter order.
    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.entries.iter().map(|e| &e.source)
    }

    /// Pick at most `limit` sources under the given policy.
    #[must_use]
    pub fn select(&self, order: SourceOrder, limit: usize) -> Vec<Source> {
        match order {
            SourceOrder::Encounter => self.iter().take(limit).cloned().collect(),
            SourceOrder::CitedFirst => self
                .entries
                .iter()
                .filter(|e| e.cited)
                .chain(self.entries.iter().filter(|e| !e.cited))
                .take(limit)
                .map(|e| e.source.clone())
                .collect(),
        }
    }
}

impl Extend<Source> for SourceSet {
    fn extend<T: IntoIterator<Item = Source>>(&mut self, iter: T) {
        for source in iter {
            self.insert(source);
        }
    }
}
