use std::borrow::Cow;

use serde::Serialize;

use super::{RenderError, non_empty, rfc3339};
use crate::domain::{FeedDocument, FeedEntry};

const VERSION: &str = "https://jsonfeed.org/version/1.1";

#[derive(Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    home_page_url: Option<&'a str>,
    feed_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    favicon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authors: Vec<Author<'a>>,
    items: Vec<Item<'a>>,
}

#[derive(Serialize)]
struct Author<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct Item<'a> {
    id: Cow<'a, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_modified: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authors: Vec<Author<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment<'a>>,
}

#[derive(Serialize)]
struct Attachment<'a> {
    url: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_in_bytes: Option<u64>,
}

/// Render a JSON Feed 1.1 document, pretty-printed.
pub fn render_json(document: &FeedDocument, self_url: &str) -> Result<String, RenderError> {
    let items = document
        .entries
        .iter()
        .map(item)
        .collect::<Result<Vec<_>, _>>()?;

    let feed = JsonFeed {
        version: VERSION,
        title: &document.title,
        home_page_url: non_empty(Some(document.link.as_str())),
        feed_url: self_url,
        description: non_empty(Some(document.description.as_str())),
        icon: non_empty(document.image.as_deref()).or(non_empty(document.logo.as_deref())),
        favicon: non_empty(document.icon.as_deref()),
        language: non_empty(document.language.as_deref()),
        authors: authors(document.author.as_deref()),
        items,
    };

    Ok(serde_json::to_string_pretty(&feed)?)
}

fn item(entry: &FeedEntry) -> Result<Item<'_>, RenderError> {
    Ok(Item {
        id: entry.identifier(),
        url: non_empty(Some(entry.link.as_str())),
        title: &entry.title,
        content_html: non_empty(Some(entry.description.as_str())),
        image: non_empty(entry.thumbnail.as_deref()),
        date_published: entry.published.map(rfc3339).transpose()?,
        date_modified: entry.updated.map(rfc3339).transpose()?,
        authors: authors(entry.author.as_deref()),
        tags: entry.categories.iter().map(String::as_str).collect(),
        attachments: entry
            .enclosure
            .iter()
            .filter(|enclosure| !enclosure.url.is_empty())
            .map(|enclosure| Attachment {
                url: &enclosure.url,
                mime_type: &enclosure.mime_type,
                size_in_bytes: enclosure.length,
            })
            .collect(),
    })
}

fn authors(name: Option<&str>) -> Vec<Author<'_>> {
    non_empty(name).map(|name| Author { name }).into_iter().collect()
}
