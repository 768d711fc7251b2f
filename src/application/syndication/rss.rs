use std::fmt::Write as _;

use super::{RenderError, cdata, non_empty, rfc822, xml_escape};
use crate::domain::{FeedDocument, FeedEntry};

/// Render an RSS 2.0 channel with Atom self link, `content:encoded` bodies and
/// Media RSS thumbnails.
pub fn render_rss(document: &FeedDocument, self_url: &str) -> Result<String, RenderError> {
    let mut channel = String::new();
    push_element(&mut channel, 4, "title", &document.title);
    push_element(&mut channel, 4, "link", &document.link);
    push_element(&mut channel, 4, "description", &document.description);
    let _ = writeln!(
        channel,
        "    <atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\"/>",
        xml_escape(self_url)
    );

    if let Some(language) = non_empty(document.language.as_deref()) {
        push_element(&mut channel, 4, "language", language);
    }
    if let Some(published) = document.published {
        push_element(&mut channel, 4, "pubDate", &rfc822(published)?);
    }
    if let Some(built) = document.last_build.or(document.published) {
        push_element(&mut channel, 4, "lastBuildDate", &rfc822(built)?);
    }
    if let Some(ttl) = document.ttl {
        push_element(&mut channel, 4, "ttl", &ttl.to_string());
    }
    if let Some(image) = non_empty(document.image.as_deref()) {
        let _ = writeln!(
            channel,
            "    <image>\n      <url>{}</url>\n      <title>{}</title>\n      <link>{}</link>\n    </image>",
            xml_escape(image),
            xml_escape(&document.title),
            xml_escape(&document.link),
        );
    }

    for entry in &document.entries {
        channel.push_str(&render_item(entry)?);
    }

    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\" xmlns:content=\"http://purl.org/rss/1.0/modules/content/\" xmlns:media=\"http://search.yahoo.com/mrss/\">\n  <channel>\n{channel}  </channel>\n</rss>\n"
    ))
}

fn render_item(entry: &FeedEntry) -> Result<String, RenderError> {
    let mut item = String::from("    <item>\n");
    push_element(&mut item, 6, "title", &entry.title);
    if !entry.link.is_empty() {
        push_element(&mut item, 6, "link", &entry.link);
    }
    if !entry.description.is_empty() {
        let _ = writeln!(item, "      <description>{}</description>", cdata(&entry.description));
    }
    if let Some(published) = entry.published {
        push_element(&mut item, 6, "pubDate", &rfc822(published)?);
    }
    let _ = writeln!(
        item,
        "      <guid isPermaLink=\"false\">{}</guid>",
        xml_escape(&entry.identifier())
    );
    if let Some(author) = non_empty(entry.author.as_deref()) {
        push_element(&mut item, 6, "author", author);
    }
    for category in &entry.categories {
        push_element(&mut item, 6, "category", category);
    }
    if let Some(comments) = non_empty(entry.comments.as_deref()) {
        push_element(&mut item, 6, "comments", comments);
    }
    if let Some(enclosure) = entry.enclosure.as_ref().filter(|e| !e.url.is_empty()) {
        let _ = writeln!(
            item,
            "      <enclosure url=\"{}\" type=\"{}\" length=\"{}\"/>",
            xml_escape(&enclosure.url),
            xml_escape(&enclosure.mime_type),
            enclosure.length.unwrap_or(0),
        );
    }
    if let Some(thumbnail) = non_empty(entry.thumbnail.as_deref()) {
        let _ = writeln!(item, "      <media:thumbnail url=\"{}\"/>", xml_escape(thumbnail));
    }
    if !entry.description.is_empty() {
        let _ = writeln!(item, "      <content:encoded>{}</content:encoded>", cdata(&entry.description));
    }
    item.push_str("    </item>\n");
    Ok(item)
}

fn push_element(out: &mut String, indent: usize, name: &str, text: &str) {
    let _ = writeln!(out, "{:indent$}<{name}>{}</{name}>", "", xml_escape(text));
}
