use std::fmt::Write as _;

use time::OffsetDateTime;

use super::{RenderError, cdata, non_empty, rfc3339, xml_escape};
use crate::domain::{FeedDocument, FeedEntry};

/// Render an Atom 1.0 feed.
///
/// `updated` is required at both levels, so it falls back to the newest
/// timestamp in the document and finally to the Unix epoch.
pub fn render_atom(document: &FeedDocument, self_url: &str) -> Result<String, RenderError> {
    let feed_updated = document
        .last_build
        .or(document.published)
        .or_else(|| document.latest_timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);

    let id = if document.link.is_empty() {
        self_url
    } else {
        document.link.as_str()
    };

    let mut feed = String::new();
    let _ = writeln!(feed, "  <title>{}</title>", xml_escape(&document.title));
    if !document.link.is_empty() {
        let _ = writeln!(
            feed,
            "  <link href=\"{}\" rel=\"alternate\"/>",
            xml_escape(&document.link)
        );
    }
    let _ = writeln!(
        feed,
        "  <link href=\"{}\" rel=\"self\" type=\"application/atom+xml\"/>",
        xml_escape(self_url)
    );
    let _ = writeln!(feed, "  <id>{}</id>", xml_escape(id));
    let _ = writeln!(feed, "  <updated>{}</updated>", rfc3339(feed_updated)?);

    let subtitle = non_empty(document.subtitle.as_deref())
        .or_else(|| non_empty(Some(document.description.as_str())));
    if let Some(subtitle) = subtitle {
        let _ = writeln!(feed, "  <subtitle>{}</subtitle>", xml_escape(subtitle));
    }
    if let Some(icon) = non_empty(document.icon.as_deref()) {
        let _ = writeln!(feed, "  <icon>{}</icon>", xml_escape(icon));
    }
    if let Some(logo) = non_empty(document.logo.as_deref()).or(non_empty(document.image.as_deref())) {
        let _ = writeln!(feed, "  <logo>{}</logo>", xml_escape(logo));
    }
    if let Some(author) = non_empty(document.author.as_deref()) {
        let _ = writeln!(feed, "  <author>\n    <name>{}</name>\n  </author>", xml_escape(author));
    }

    for entry in &document.entries {
        feed.push_str(&render_entry(entry, feed_updated)?);
    }

    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">\n{feed}</feed>\n"
    ))
}

fn render_entry(entry: &FeedEntry, feed_updated: OffsetDateTime) -> Result<String, RenderError> {
    let updated = entry.updated.or(entry.published).unwrap_or(feed_updated);

    let mut out = String::from("  <entry>\n");
    let _ = writeln!(out, "    <title>{}</title>", xml_escape(&entry.title));
    if !entry.link.is_empty() {
        let _ = writeln!(
            out,
            "    <link href=\"{}\" rel=\"alternate\"/>",
            xml_escape(&entry.link)
        );
    }
    let _ = writeln!(out, "    <id>{}</id>", xml_escape(&entry.identifier()));
    let _ = writeln!(out, "    <updated>{}</updated>", rfc3339(updated)?);
    if let Some(published) = entry.published {
        let _ = writeln!(out, "    <published>{}</published>", rfc3339(published)?);
    }
    if !entry.description.is_empty() {
        let _ = writeln!(
            out,
            "    <content type=\"html\">{}</content>",
            cdata(&entry.description)
        );
    }
    if let Some(author) = non_empty(entry.author.as_deref()) {
        let _ = writeln!(out, "    <author>\n      <name>{}</name>\n    </author>", xml_escape(author));
    }
    for category in &entry.categories {
        let _ = writeln!(out, "    <category term=\"{}\"/>", xml_escape(category));
    }
    if let Some(enclosure) = entry.enclosure.as_ref().filter(|e| !e.url.is_empty()) {
        let length = enclosure
            .length
            .map(|length| format!(" length=\"{length}\""))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "    <link href=\"{}\" rel=\"enclosure\" type=\"{}\"{length}/>",
            xml_escape(&enclosure.url),
            xml_escape(&enclosure.mime_type),
        );
    }
    out.push_str("  </entry>\n");
    Ok(out)
}
