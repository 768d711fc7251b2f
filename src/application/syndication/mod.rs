//! Feed renderers for RSS 2.0, Atom 1.0 and JSON Feed 1.1.
//!
//! Renderers are pure: the same document and self URL always produce the same
//! bytes. Nothing here reads the clock; missing timestamps fall back to other
//! timestamps in the document.

mod atom;
mod json;
mod rss;

use thiserror::Error;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use crate::domain::FeedDocument;

pub use atom::render_atom;
pub use json::render_json;
pub use rss::render_rss;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("timestamp cannot be formatted: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FeedFormat {
    #[default]
    Rss,
    Atom,
    Json,
}

impl FeedFormat {
    /// Unknown values fall back to RSS.
    pub fn from_param(value: &str) -> Self {
        match value {
            "atom" => Self::Atom,
            "json" => Self::Json,
            _ => Self::Rss,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Atom => "atom",
            Self::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Rss => "application/rss+xml; charset=utf-8",
            Self::Atom => "application/atom+xml; charset=utf-8",
            Self::Json => "application/json; charset=utf-8",
        }
    }

    pub fn render(self, document: &FeedDocument, self_url: &str) -> Result<String, RenderError> {
        match self {
            Self::Rss => render_rss(document, self_url),
            Self::Atom => render_atom(document, self_url),
            Self::Json => render_json(document, self_url),
        }
    }
}

fn rfc822(value: OffsetDateTime) -> Result<String, RenderError> {
    Ok(value.to_offset(UtcOffset::UTC).format(&Rfc2822)?)
}

fn rfc3339(value: OffsetDateTime) -> Result<String, RenderError> {
    Ok(value.to_offset(UtcOffset::UTC).format(&Rfc3339)?)
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Wrap markup in CDATA, splitting any `]]>` it contains.
fn cdata(input: &str) -> String {
    format!("<![CDATA[{}]]>", input.replace("]]>", "]]]]><![CDATA[>"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::{Enclosure, FeedEntry};

    pub(super) fn sample() -> FeedDocument {
        let mut first = FeedEntry::new("Hello & welcome", "https://x/1");
        first.description = "<p>Body with ]]> inside</p>".into();
        first.published = Some(datetime!(2024-05-01 12:00 +02:00));
        first.author = Some("Feed Team".into());
        first.categories = vec!["demo".into(), "news".into()];
        first.enclosure = Some(Enclosure {
            url: "https://x/1.mp3".into(),
            mime_type: "audio/mpeg".into(),
            length: Some(1024),
        });
        first.thumbnail = Some("https://x/1.png".into());

        let mut second = FeedEntry::new("Second", "https://x/2");
        second.guid = Some("urn:x:2".into());
        second.updated = Some(datetime!(2024-05-02 08:30 UTC));

        let mut doc = FeedDocument::new("Sample <Feed>", "https://x").with_entries(vec![first, second]);
        doc.description = "A sample".into();
        doc.language = Some("en".into());
        doc
    }

    #[test]
    fn format_parsing_defaults_to_rss() {
        assert_eq!(FeedFormat::from_param("atom"), FeedFormat::Atom);
        assert_eq!(FeedFormat::from_param("json"), FeedFormat::Json);
        assert_eq!(FeedFormat::from_param("rss"), FeedFormat::Rss);
        assert_eq!(FeedFormat::from_param("ATOM"), FeedFormat::Rss);
    }

    #[test]
    fn content_types_per_format() {
        assert_eq!(FeedFormat::Rss.content_type(), "application/rss+xml; charset=utf-8");
        assert_eq!(FeedFormat::Atom.content_type(), "application/atom+xml; charset=utf-8");
        assert_eq!(FeedFormat::Json.content_type(), "application/json; charset=utf-8");
    }

    #[test]
    fn dates_are_normalised_to_utc() {
        let local = datetime!(2024-05-01 12:00 +02:00);
        assert_eq!(rfc822(local).unwrap(), "Wed, 01 May 2024 10:00:00 +0000");
        assert_eq!(rfc3339(local).unwrap(), "2024-05-01T10:00:00Z");
    }

    #[test]
    fn cdata_splits_terminator() {
        assert_eq!(cdata("a]]>b"), "<![CDATA[a]]]]><![CDATA[>b]]>");
    }

    #[test]
    fn guidless_entry_uses_link_in_every_format() {
        let doc = FeedDocument::new("t", "https://x").with_entries(vec![FeedEntry::new("one", "https://x/1")]);
        let url = "http://localhost:1200/ns/route";

        let rss = FeedFormat::Rss.render(&doc, url).unwrap();
        assert!(rss.contains("<guid isPermaLink=\"false\">https://x/1</guid>"), "{rss}");

        let atom = FeedFormat::Atom.render(&doc, url).unwrap();
        assert!(atom.contains("<id>https://x/1</id>"), "{atom}");

        let json = FeedFormat::Json.render(&doc, url).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["items"][0]["id"], "https://x/1");
    }

    #[test]
    fn rendering_is_idempotent() {
        let doc = sample();
        let url = "http://localhost:1200/ns/route?format=x";
        for format in [FeedFormat::Rss, FeedFormat::Atom, FeedFormat::Json] {
            let first = format.render(&doc, url).unwrap();
            let second = format.render(&doc, url).unwrap();
            assert_eq!(first, second, "{format:?} output differs");
        }
    }
}
