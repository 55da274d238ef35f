// tests/feed_parsing.rs
//
// RSS 2.0 / Atom fixture parsing through the public parser.

use aec_news_pipeline::scout::feed::parse_feed;
use aec_news_pipeline::PipelineError;

const RSS: &str = include_str!("fixtures/aec_rss.xml");
const ATOM: &str = include_str!("fixtures/aec_atom.xml");

#[test]
fn rss_fixture_yields_clean_entries() {
    let feed = parse_feed("aecmag", RSS).expect("parse rss fixture");
    assert_eq!(feed.entries.len(), 2, "link-less item must be skipped");
    assert_eq!(feed.skipped, 1);

    let first = &feed.entries[0];
    assert_eq!(first.title, "Digital twins move from pilot to practice");
    assert!(first.url.contains("utm_source=rss&utm_medium=feed"));
    assert!(first.body.starts_with("Owners are using BIM and digital twin models"));
    assert!(!first.body.contains('<'));
    assert_eq!(
        first.published_at.map(|d| d.to_rfc3339()).as_deref(),
        Some("2024-01-16T10:00:00+00:00")
    );

    // Link falls back to a URL-shaped guid; curly quotes are normalized.
    let second = &feed.entries[1];
    assert_eq!(second.url, "https://aecmag.com/robotics/bricklaying/");
    assert_eq!(second.title, "Robots on site: the \"bricklaying\" question");
}

#[test]
fn atom_fixture_prefers_alternate_link_and_content() {
    let feed = parse_feed("ctw", ATOM).expect("parse atom fixture");
    assert_eq!(feed.entries.len(), 2);
    assert_eq!(feed.skipped, 0);

    let first = &feed.entries[0];
    assert_eq!(first.url, "https://ctw.example/generative-design");
    assert_eq!(
        first.body,
        "Parametric and generative design workflows are spreading across engineering firms."
    );
    assert_eq!(
        first.published_at.map(|d| d.to_rfc3339()).as_deref(),
        Some("2024-01-16T09:00:00+00:00"),
        "published wins over updated"
    );

    // No <published>: <updated> with offset, normalized to UTC.
    let second = &feed.entries[1];
    assert_eq!(second.url, "https://ctw.example/smart-sensors");
    assert_eq!(
        second.published_at.map(|d| d.to_rfc3339()).as_deref(),
        Some("2024-01-15T06:15:00+00:00")
    );
}

#[test]
fn html_page_is_a_feed_level_parse_error() {
    let err = parse_feed("bad", "<!DOCTYPE html><html><body>503</body></html>").unwrap_err();
    assert!(matches!(err, PipelineError::Parse { .. }));
    assert!(!err.is_retryable());
}
