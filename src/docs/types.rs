use serde::{Deserialize, Serialize};

/// One subject category with its own link feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Short key used on the command line, e.g. "security".
    pub key: String,
    /// Heading used in the rendered digest.
    pub title: String,
    /// CSV feed listing recently published links for this topic.
    pub feed_url: String,
}

impl Topic {
    pub fn new(key: &str, title: &str, feed_url: &str) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            feed_url: feed_url.to_string(),
        }
    }
}

/// Readable text extracted from one article link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    /// The article URL the text was extracted from.
    pub source_id: String,
}

/// A document whose text ends with its `[tag]` citation marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedDocument {
    pub text: String,
    pub source_id: String,
    pub tag: String,
}

/// Output of one reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    /// Set when the summary covers a single tagged document.
    pub tag: Option<String>,
    pub source_id: Option<String>,
}

/// Bracketed marker (`"[a1b2c3d]"`) to source URL, in insertion order.
///
/// Re-inserting an existing marker overwrites its URL but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationMap {
    entries: Vec<(String, String)>,
}

impl CitationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, marker: impl Into<String>, url: impl Into<String>) {
        let marker = marker.into();
        let url = url.into();
        match self.entries.iter_mut().find(|(m, _)| *m == marker) {
            Some(entry) => entry.1 = url,
            None => self.entries.push((marker, url)),
        }
    }

    pub fn get(&self, marker: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(m, _)| m == marker)
            .map(|(_, url)| url.as_str())
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.get(marker).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(m, u)| (m.as_str(), u.as_str()))
    }

    /// Absorb another map; its entries win on marker collision.
    pub fn merge(&mut self, other: &CitationMap) {
        for (marker, url) in other.iter() {
            self.insert(marker, url);
        }
    }
}

impl<M: Into<String>, U: Into<String>> FromIterator<(M, U)> for CitationMap {
    fn from_iter<I: IntoIterator<Item = (M, U)>>(iter: I) -> Self {
        let mut map = CitationMap::new();
        for (marker, url) in iter {
            map.insert(marker, url);
        }
        map
    }
}
