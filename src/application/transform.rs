//! Query-driven reshaping of a feed's entry list.
//!
//! Parameters are parsed once per request into an [`EntryTransform`]; a value
//! that does not parse disables only its own step and is logged.

use regex::{Regex, RegexBuilder};
use time::{Duration, OffsetDateTime};
use tracing::warn;
use url::form_urlencoded;

use super::syndication::FeedFormat;
use crate::domain::{FeedDocument, FeedEntry};

const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Filter, sort and limit steps, applied in a fixed order:
/// include, exclude, title, description, freshness, sort, limit.
#[derive(Debug, Clone, Default)]
pub struct EntryTransform {
    /// Keep entries whose title or description matches.
    include: Option<Regex>,
    /// Drop entries whose title or description matches.
    exclude: Option<Regex>,
    title: Option<Regex>,
    description: Option<Regex>,
    /// Keep entries published within this window; undated entries are dropped.
    max_age: Option<Duration>,
    order: Option<SortOrder>,
    limit: Option<usize>,
}

impl EntryTransform {
    /// Build from query pairs. Empty values count as absent.
    pub fn from_query(query: &[(String, String)]) -> Self {
        let value = |name: &str| {
            query
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
                .filter(|value| !value.is_empty())
        };

        Self {
            include: value("filter").and_then(|raw| compile("filter", raw)),
            exclude: value("filterout").and_then(|raw| compile("filterout", raw)),
            title: value("filter_title").and_then(|raw| compile("filter_title", raw)),
            description: value("filter_description")
                .and_then(|raw| compile("filter_description", raw)),
            max_age: value("filter_time").and_then(parse_max_age),
            order: value("sorted").map(parse_order),
            limit: value("limit").and_then(parse_limit),
        }
    }

    /// True when no step would change the entry list.
    pub fn is_identity(&self) -> bool {
        self.include.is_none()
            && self.exclude.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.max_age.is_none()
            && self.order.is_none()
            && self.limit.is_none()
    }

    pub fn apply(&self, document: &mut FeedDocument) {
        self.apply_at(document, OffsetDateTime::now_utc());
    }

    /// [`apply`](Self::apply) with an explicit clock for the freshness step.
    pub fn apply_at(&self, document: &mut FeedDocument, now: OffsetDateTime) {
        if self.is_identity() {
            return;
        }

        let mut entries = std::mem::take(&mut document.entries);

        if let Some(re) = &self.include {
            entries.retain(|entry| matches_either(re, entry));
        }
        if let Some(re) = &self.exclude {
            entries.retain(|entry| !matches_either(re, entry));
        }
        if let Some(re) = &self.title {
            entries.retain(|entry| re.is_match(&entry.title));
        }
        if let Some(re) = &self.description {
            entries.retain(|entry| re.is_match(&entry.description));
        }
        if let Some(max_age) = self.max_age {
            match now.checked_sub(max_age) {
                Some(cutoff) => entries
                    .retain(|entry| entry.published.is_some_and(|published| published > cutoff)),
                None => warn!(
                    target = "application::transform",
                    param = "filter_time",
                    seconds = max_age.whole_seconds(),
                    "filter_time reaches past the supported date range; skipping"
                ),
            }
        }
        if let Some(order) = self.order {
            // `sort_by` is stable; undated entries sort as the oldest.
            entries.sort_by(|a, b| {
                let ordering = a.published.cmp(&b.published);
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }

        document.entries = entries;
    }
}

fn matches_either(re: &Regex, entry: &FeedEntry) -> bool {
    re.is_match(&entry.title) || re.is_match(&entry.description)
}

fn compile(param: &'static str, raw: &str) -> Option<Regex> {
    match RegexBuilder::new(raw).size_limit(REGEX_SIZE_LIMIT).build() {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(
                target = "application::transform",
                param,
                pattern = raw,
                error = %err,
                "ignoring invalid filter pattern"
            );
            None
        }
    }
}

fn parse_max_age(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<i64>() {
        Ok(seconds) if seconds >= 0 => Some(Duration::seconds(seconds)),
        Ok(seconds) => {
            warn!(
                target = "application::transform",
                param = "filter_time",
                seconds,
                "ignoring negative filter_time"
            );
            None
        }
        Err(err) => {
            warn!(
                target = "application::transform",
                param = "filter_time",
                value = raw,
                error = %err,
                "ignoring invalid filter_time"
            );
            None
        }
    }
}

/// `desc` sorts newest first; any other value sorts oldest first.
fn parse_order(raw: &str) -> SortOrder {
    match raw {
        "desc" => SortOrder::Descending,
        _ => SortOrder::Ascending,
    }
}

fn parse_limit(raw: &str) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => {
            warn!(
                target = "application::transform",
                param = "limit",
                value = raw,
                "ignoring limit that is not a positive integer"
            );
            None
        }
        Ok(limit) => Some(limit),
    }
}

/// Per-request rendering options parsed from the query string.
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    pub format: FeedFormat,
    pub transform: EntryTransform,
    /// Decoded query pairs in request order.
    pub pairs: Vec<(String, String)>,
}

impl FeedQuery {
    /// Parse a raw (still percent-encoded) query string.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let pairs = raw
            .map(|raw| form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self::from_query(pairs)
    }

    pub fn from_query(pairs: Vec<(String, String)>) -> Self {
        let format = pairs
            .iter()
            .find(|(key, _)| key == "format")
            .map(|(_, value)| FeedFormat::from_param(value))
            .unwrap_or_default();

        Self {
            format,
            transform: EntryTransform::from_query(&pairs),
            pairs,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn query(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn titles(doc: &FeedDocument) -> Vec<&str> {
        doc.entries.iter().map(|entry| entry.title.as_str()).collect()
    }

    fn document(entries: &[(&str, Option<OffsetDateTime>)]) -> FeedDocument {
        let entries = entries
            .iter()
            .enumerate()
            .map(|(i, (title, published))| {
                let mut entry = FeedEntry::new(*title, format!("https://x/{i}"));
                entry.published = *published;
                entry
            })
            .collect();
        FeedDocument::new("t", "https://x").with_entries(entries)
    }

    const T: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    #[test]
    fn include_filter_keeps_order() {
        let mut doc = document(&[("Bug A", None), ("Feature B", None), ("Bug C", None)]);
        EntryTransform::from_query(&query(&[("filter", "(?i)bug")])).apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["Bug A", "Bug C"]);
    }

    #[test]
    fn include_filter_matches_description() {
        let mut doc = document(&[("One", None), ("Two", None)]);
        doc.entries[1].description = "<p>fixes a crash</p>".into();
        EntryTransform::from_query(&query(&[("filter", "crash")])).apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["Two"]);
    }

    #[test]
    fn exclude_sort_desc_then_limit() {
        let hour = Duration::hours(1);
        let mut doc = document(&[
            ("Alpha", Some(T)),
            ("Beta", Some(T + hour)),
            ("Gamma", Some(T - hour)),
        ]);
        let transform = EntryTransform::from_query(&query(&[
            ("filterout", "(?i)bug"),
            ("sorted", "desc"),
            ("limit", "1"),
        ]));
        transform.apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["Beta"]);
    }

    #[test]
    fn invalid_regex_is_a_no_op() {
        let mut doc = document(&[("Bug A", None), ("Feature B", None)]);
        let transform = EntryTransform::from_query(&query(&[("filter", "[invalid(")]));
        assert!(transform.is_identity());
        transform.apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["Bug A", "Feature B"]);
    }

    #[test]
    fn invalid_numbers_disable_only_their_step() {
        let mut doc = document(&[("b", Some(T)), ("a", Some(T - Duration::hours(1)))]);
        let transform = EntryTransform::from_query(&query(&[
            ("filter_time", "soon"),
            ("limit", "0"),
            ("sorted", "asc"),
        ]));
        transform.apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["a", "b"]);
    }

    #[test]
    fn title_and_description_filters() {
        let mut doc = document(&[("Release 1.0", None), ("Release notes", None), ("Other", None)]);
        doc.entries[0].description = "stable".into();
        doc.entries[1].description = "draft".into();

        let transform = EntryTransform::from_query(&query(&[
            ("filter_title", "^Release"),
            ("filter_description", "stable"),
        ]));
        transform.apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["Release 1.0"]);
    }

    #[test]
    fn freshness_drops_old_and_undated_entries() {
        let mut doc = document(&[
            ("fresh", Some(T - Duration::minutes(5))),
            ("stale", Some(T - Duration::hours(2))),
            ("undated", None),
        ]);
        EntryTransform::from_query(&query(&[("filter_time", "3600")])).apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["fresh"]);
    }

    #[test]
    fn sort_is_stable_for_equal_timestamps() {
        let mut doc = document(&[("first", Some(T)), ("second", Some(T)), ("old", None)]);
        EntryTransform::from_query(&query(&[("sorted", "desc")])).apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["first", "second", "old"]);

        EntryTransform::from_query(&query(&[("sorted", "asc")])).apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["old", "first", "second"]);
    }

    #[test]
    fn unknown_sort_order_sorts_ascending() {
        let mut doc = document(&[("b", Some(T)), ("a", Some(T - Duration::hours(1)))]);
        EntryTransform::from_query(&query(&[("sorted", "random")])).apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["a", "b"]);
    }

    #[test]
    fn out_of_range_filter_time_leaves_entries_untouched() {
        let entries = [("b", Some(T)), ("a", Some(T - Duration::hours(1))), ("c", None)];

        let mut doc = document(&entries);
        let transform =
            EntryTransform::from_query(&query(&[("filter_time", "9223372036854775807")]));
        transform.apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["b", "a", "c"]);

        let mut doc = document(&entries);
        let transform = EntryTransform::from_query(&query(&[("filter_time", "-60")]));
        assert!(transform.is_identity());
        transform.apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["b", "a", "c"]);
    }

    #[test]
    fn empty_values_count_as_absent() {
        let transform = EntryTransform::from_query(&query(&[("filter", ""), ("limit", "")]));
        assert!(transform.is_identity());
    }

    #[test]
    fn feed_query_resolves_format() {
        assert_eq!(FeedQuery::from_raw(None).format, FeedFormat::Rss);
        assert_eq!(FeedQuery::from_raw(Some("format=atom")).format, FeedFormat::Atom);
        assert_eq!(FeedQuery::from_raw(Some("format=yaml")).format, FeedFormat::Rss);
    }

    #[test]
    fn feed_query_decodes_pairs() {
        let parsed = FeedQuery::from_raw(Some("filter=%28%3Fi%29bug&limit=2&filter=ignored"));
        assert_eq!(parsed.pairs[0], ("filter".to_string(), "(?i)bug".to_string()));

        let mut doc = document(&[("Bug A", None), ("Feature B", None), ("Bug C", None), ("bug D", None)]);
        parsed.transform.apply_at(&mut doc, T);
        assert_eq!(titles(&doc), ["Bug A", "Bug C"]);
    }
}
