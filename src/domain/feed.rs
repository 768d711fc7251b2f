//! Feed document model shared by handlers, the parameter transform and the renderers.

use std::borrow::Cow;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// A feed as produced by a route handler, before rendering.
///
/// Entries keep the order the handler produced them in unless a transform
/// explicitly sorts them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    /// Canonical link of the site the feed describes.
    pub link: String,
    pub description: String,
    pub language: Option<String>,
    pub published: Option<OffsetDateTime>,
    pub last_build: Option<OffsetDateTime>,
    /// Suggested refresh interval in minutes (RSS `ttl`).
    pub ttl: Option<u32>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub logo: Option<String>,
    /// An empty entry list is a valid result only when this is set.
    pub allow_empty: bool,
    pub entries: Vec<FeedEntry>,
}

impl FeedDocument {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            ..Default::default()
        }
    }

    pub fn with_entries(mut self, entries: Vec<FeedEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Whether the document may be rendered as it stands.
    pub fn is_renderable(&self) -> bool {
        self.allow_empty || !self.entries.is_empty()
    }

    /// Most recent timestamp carried by the document or any of its entries.
    pub fn latest_timestamp(&self) -> Option<OffsetDateTime> {
        let own = [self.last_build, self.published];
        let entries = self
            .entries
            .iter()
            .flat_map(|entry| [entry.updated, entry.published]);
        own.into_iter().chain(entries).flatten().max()
    }
}

/// One item of a [`FeedDocument`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// HTML body; renderers wrap it so it is not escaped as plain text.
    pub description: String,
    pub published: Option<OffsetDateTime>,
    pub updated: Option<OffsetDateTime>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub guid: Option<String>,
    pub comments: Option<String>,
    pub enclosure: Option<Enclosure>,
    pub thumbnail: Option<String>,
}

impl FeedEntry {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            ..Default::default()
        }
    }

    /// Stable, non-empty identifier for the entry: the GUID, else the link,
    /// else a `urn:sha256:` digest of the title and description.
    pub fn identifier(&self) -> Cow<'_, str> {
        let present = |value: &str| !value.trim().is_empty();
        if let Some(guid) = self.guid.as_deref().filter(|guid| present(guid)) {
            return Cow::Borrowed(guid);
        }
        if present(&self.link) {
            return Cow::Borrowed(&self.link);
        }

        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.description.as_bytes());
        Cow::Owned(format!("urn:sha256:{}", hex::encode(hasher.finalize().to_vec())))
    }
}

/// Media attached to an entry (podcast audio, video, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
    pub length: Option<u64>,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn identifier_falls_back_to_link() {
        let mut entry = FeedEntry::new("First", "https://x/1");
        assert_eq!(entry.identifier(), "https://x/1");

        entry.guid = Some("   ".to_string());
        assert_eq!(entry.identifier(), "https://x/1");

        entry.guid = Some("urn:entry:1".to_string());
        assert_eq!(entry.identifier(), "urn:entry:1");
    }

    #[test]
    fn identifier_without_guid_or_link_is_a_content_digest() {
        let mut entry = FeedEntry::new("Release notes", "");
        entry.description = "<p>v1.2</p>".to_string();

        let id = entry.identifier().into_owned();
        assert!(id.starts_with("urn:sha256:"), "{id}");
        assert_eq!(id.len(), "urn:sha256:".len() + 64);
        assert_eq!(entry.identifier(), id);

        entry.title = "Release notes v2".to_string();
        assert_ne!(entry.identifier(), id);
    }

    #[test]
    fn empty_document_needs_allow_empty() {
        let mut doc = FeedDocument::new("Empty", "https://example.com");
        assert!(!doc.is_renderable());

        doc.allow_empty = true;
        assert!(doc.is_renderable());
    }

    #[test]
    fn latest_timestamp_scans_entries() {
        let mut older = FeedEntry::new("a", "https://x/a");
        older.published = Some(datetime!(2024-01-01 00:00 UTC));
        let mut newer = FeedEntry::new("b", "https://x/b");
        newer.updated = Some(datetime!(2024-03-01 12:00 UTC));

        let doc = FeedDocument::new("t", "https://x").with_entries(vec![older, newer]);
        assert_eq!(doc.latest_timestamp(), Some(datetime!(2024-03-01 12:00 UTC)));

        assert_eq!(FeedDocument::new("t", "https://x").latest_timestamp(), None);
    }
}
