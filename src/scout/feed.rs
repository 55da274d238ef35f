//! RSS 2.0 / Atom parsing into flat feed entries.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::{PipelineError, Result};
use crate::metrics::PARSE_ERRORS;

/// Longest body kept per entry, in chars.
pub const MAX_BODY_CHARS: usize = 5_000;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub url: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub entries: Vec<FeedEntry>,
    /// Entries dropped for missing title or link.
    pub skipped: usize,
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}
#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<TextNode>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}
#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    published: Option<String>,
    updated: Option<String>,
}
/// Element text, ignoring attributes (`type="html"`, `isPermaLink`).
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Rss,
    Atom,
}

/// Parse a feed document. A document that is not RSS/Atom is an error;
/// entries without a title or link are skipped and counted.
pub fn parse_feed(source_id: &str, xml: &str) -> Result<ParsedFeed> {
    let t0 = std::time::Instant::now();
    let cleaned = scrub_html_entities_for_xml(xml);

    let parse_err = |message: String| {
        counter!(PARSE_ERRORS, "level" => "feed").increment(1);
        PipelineError::Parse {
            source_id: source_id.to_string(),
            message,
        }
    };

    let flavor = match root_element(&cleaned) {
        Some(name) if name == "rss" => Flavor::Rss,
        Some(name) if name == "feed" => Flavor::Atom,
        Some(name) => return Err(parse_err(format!("unsupported root element <{name}>"))),
        None => return Err(parse_err("document has no root element".into())),
    };

    let raw: Vec<(Option<String>, Option<String>, String, Option<DateTime<Utc>>)> = match flavor {
        Flavor::Rss => {
            let rss: Rss = from_str(&cleaned).map_err(|e| parse_err(e.to_string()))?;
            rss.channel
                .item
                .into_iter()
                .map(|it| {
                    let link = it.link.or_else(|| {
                        it.guid
                            .map(|g| g.value.trim().to_string())
                            .filter(|g| g.starts_with("http"))
                    });
                    (
                        it.title,
                        link,
                        it.description.unwrap_or_default(),
                        it.pub_date.as_deref().and_then(parse_rfc2822),
                    )
                })
                .collect()
        }
        Flavor::Atom => {
            let feed: AtomFeed = from_str(&cleaned).map_err(|e| parse_err(e.to_string()))?;
            feed.entry
                .into_iter()
                .map(|e| {
                    let link = e
                        .links
                        .iter()
                        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                        .or_else(|| e.links.first())
                        .and_then(|l| l.href.clone());
                    let body = e
                        .content
                        .or(e.summary)
                        .map(|t| t.value)
                        .unwrap_or_default();
                    let date = e
                        .published
                        .as_deref()
                        .or(e.updated.as_deref())
                        .and_then(parse_rfc3339);
                    (e.title.map(|t| t.value), link, body, date)
                })
                .collect()
        }
    };

    let mut out = ParsedFeed::default();
    for (title, link, body, published_at) in raw {
        let title = title.map(|t| clean_text(&t)).unwrap_or_default();
        let url = link.map(|l| l.trim().to_string()).unwrap_or_default();
        if title.is_empty() || url.is_empty() {
            out.skipped += 1;
            continue;
        }
        out.entries.push(FeedEntry {
            title,
            url,
            body: clean_text(&body),
            published_at,
        });
    }

    if out.skipped > 0 {
        counter!(PARSE_ERRORS, "level" => "item").increment(out.skipped as u64);
        tracing::debug!(target: "scout", source_id, skipped = out.skipped, "feed entries skipped");
    }
    histogram!("scout_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

/// Local name of the first element in the document.
fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(to_chrono)
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .and_then(to_chrono)
}

fn to_chrono(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// Rewrite HTML named entities (undefined in XML) to numeric references.
fn scrub_html_entities_for_xml(s: &str) -> String {
    static RE_ENTITY: OnceCell<Regex> = OnceCell::new();
    let re = RE_ENTITY.get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]{1,31});").unwrap());
    re.replace_all(s, |caps: &regex::Captures| {
        let name = &caps[1];
        if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
            return caps[0].to_string();
        }
        let decoded = html_escape::decode_html_entities(&caps[0]);
        if decoded == caps[0] {
            // Unknown entity: keep the text literally.
            format!("&amp;{name};")
        } else {
            decoded.chars().map(|c| format!("&#{};", c as u32)).collect()
        }
    })
    .into_owned()
}

/// Decode entities, strip tags, ASCII quotes, collapse whitespace, cap length.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_BODY_CHARS {
        out = out.chars().take(MAX_BODY_CHARS).collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_tags_and_collapses_ws() {
        let s = "  <p>Digital&nbsp;twins <b>at</b>\n scale</p> ";
        assert_eq!(clean_text(s), "Digital twins at scale");
    }

    #[test]
    fn html_entities_become_numeric() {
        let s = scrub_html_entities_for_xml("a&nbsp;b &amp; c &bogus; &mdash;");
        assert_eq!(s, "a&#160;b &amp; c &amp;bogus; &#8212;");
    }

    #[test]
    fn non_feed_document_is_a_parse_error() {
        let err = parse_feed("s", "<html><body>nope</body></html>").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
        assert!(parse_feed("s", "not xml at all").is_err());
    }

    #[test]
    fn rss_item_without_link_is_skipped() {
        let xml = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>Kept</title><link>https://a.test/1</link>
              <pubDate>Tue, 16 Jan 2024 10:00:00 +0000</pubDate></item>
            <item><title>No link</title></item>
        </channel></rss>"#;
        let feed = parse_feed("s", xml).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.skipped, 1);
        assert_eq!(
            feed.entries[0].published_at.unwrap().to_rfc3339(),
            "2024-01-16T10:00:00+00:00"
        );
    }
}
