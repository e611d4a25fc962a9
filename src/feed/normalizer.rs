//! Field extraction for raw feed items.
//!
//! Feeds spell the same field many ways (`guid` vs `id`, `description` vs
//! `summary`, `<link>text</link>` vs `<link href=".."/>`). Each field is
//! resolved from an ordered list of [`Locator`]s; the first one yielding a
//! non-empty trimmed value wins.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use super::document::Element;
use super::parser::RawItem;
use crate::storage::ParsedItem;

/// Where to look for a field value on an item node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// Text of the first matching child element that has non-empty text.
    Text(&'static str),
    /// Attribute of the first matching child element that carries it.
    ChildAttr(&'static str, &'static str),
    /// `href` of the first matching child that is an alternate link
    /// (`rel="alternate"` or no `rel`). Skips Atom's self, enclosure and
    /// related links.
    AlternateHref(&'static str),
    /// Attribute on the item element itself.
    Attr(&'static str),
}

use Locator::{AlternateHref, Attr, ChildAttr, Text};

const GUID: &[Locator] = &[Text("guid"), Text("id"), Attr("guid"), Attr("id")];

const TITLE: &[Locator] = &[Text("title"), Attr("title")];

const DESCRIPTION: &[Locator] = &[
    Text("description"),
    Text("summary"),
    Attr("description"),
    Attr("summary"),
];

const CONTENT: &[Locator] = &[
    Text("content:encoded"),
    Text("content"),
    Text("description"),
    Attr("content:encoded"),
    Attr("content"),
    Attr("description"),
];

// Atom carries the link in <link href="..."/>, so the child attribute sits
// after the text forms and before attributes of the item itself.
const LINK: &[Locator] = &[
    Text("link"),
    Text("href"),
    AlternateHref("link"),
    Attr("link"),
    Attr("href"),
];

const IMAGE: &[Locator] = &[
    ChildAttr("enclosure", "url"),
    ChildAttr("media:content", "url"),
    ChildAttr("media:thumbnail", "url"),
    ChildAttr("image", "url"),
];

const PUBLISHED: &[Locator] = &[
    Text("pubDate"),
    Text("published"),
    Text("updated"),
    Text("dc:date"),
];

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["'][^>]*>"#).expect("img src pattern is valid")
});

/// Date layouts tried after RFC 2822 and RFC 3339, all read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

/// Zone abbreviations chrono's RFC 2822 parser does not know, with their
/// fixed offsets. Only unambiguous ones are listed.
const ZONE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("UTC", "+0000"),
    ("WET", "+0000"),
    ("WEST", "+0100"),
    ("BST", "+0100"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("EET", "+0200"),
    ("EEST", "+0300"),
    ("MSK", "+0300"),
    ("MSD", "+0400"),
];

const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
];

/// Returns the first non-empty, trimmed value produced by `locators`.
pub fn first_value(node: &Element, locators: &[Locator]) -> Option<String> {
    locators.iter().find_map(|locator| locate(node, *locator))
}

fn locate(node: &Element, locator: Locator) -> Option<String> {
    match locator {
        Text(name) => node.children_named(name).find_map(|c| non_empty(c.text())),
        ChildAttr(name, attr) => node
            .children_named(name)
            .find_map(|c| c.attribute(attr).and_then(non_empty)),
        AlternateHref(name) => node
            .children_named(name)
            .filter(|c| c.attribute("rel").map_or(true, |rel| rel.trim() == "alternate"))
            .find_map(|c| c.attribute("href").and_then(non_empty)),
        Attr(name) => node.attribute(name).and_then(non_empty),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalizes one raw item into a storable [`ParsedItem`].
///
/// `now` (Unix seconds) stands in for the publication time when no date
/// field parses.
///
/// Returns `None` when the item has no usable identity (no guid/id and no
/// link) or no title: without identity it cannot be deduplicated, and a
/// title is mandatory.
pub fn normalize(item: &RawItem, now: i64) -> Option<ParsedItem> {
    let node = item.node();

    let link = first_value(node, LINK);
    let guid = first_value(node, GUID).or_else(|| link.clone())?;
    let title = first_value(node, TITLE)?;

    let description = first_value(node, DESCRIPTION);
    let content = first_value(node, CONTENT);
    let image_url = first_value(node, IMAGE).or_else(|| {
        description
            .as_deref()
            .and_then(find_img_src)
            .or_else(|| content.as_deref().and_then(find_img_src))
    });
    let published_at = published_timestamp(node).unwrap_or(now);

    Some(ParsedItem {
        guid,
        title,
        description,
        content,
        link,
        image_url,
        published_at,
    })
}

/// First `<img src="...">` URL in an HTML fragment.
pub fn find_img_src(html: &str) -> Option<String> {
    IMG_SRC
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| non_empty(m.as_str()))
}

/// First date field that parses, as Unix seconds. Unparsable values fall
/// through to the next field.
fn published_timestamp(node: &Element) -> Option<i64> {
    PUBLISHED.iter().find_map(|locator| {
        let raw = locate(node, *locator)?;
        match parse_date(&raw) {
            Some(ts) => Some(ts),
            None => {
                tracing::debug!(value = %raw, field = ?locator, "Unparsable date, trying next field");
                None
            }
        }
    })
}

/// Parses the date spellings seen in RSS and Atom feeds into Unix seconds.
pub fn parse_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.timestamp());
    }
    if let Some(dt) = with_numeric_zone(raw).and_then(|r| DateTime::parse_from_rfc2822(&r).ok()) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.timestamp());
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Rewrites a trailing zone abbreviation from [`ZONE_ABBREVIATIONS`] as a
/// numeric offset.
fn with_numeric_zone(raw: &str) -> Option<String> {
    let (rest, zone) = raw.rsplit_once(' ')?;
    ZONE_ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| zone.eq_ignore_ascii_case(abbr))
        .map(|(_, offset)| format!("{} {}", rest, offset))
}

/// Current time in Unix seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}
