//! Full-text extraction from article pages.

use scraper::{ElementRef, Html, Node, Selector};

use super::feed::MAX_BODY_CHARS;

/// Tried in order; the first match with text wins, then `<body>`.
const CONTENT_SELECTORS: [&str; 8] = [
    "article",
    ".article-content",
    ".post-content",
    ".entry-content",
    ".content",
    ".article-body",
    "[role=\"main\"]",
    "main",
];

/// Subtrees that never hold article text.
const SKIP_TAGS: [&str; 10] = [
    "script", "style", "noscript", "svg", "nav", "footer", "aside", "header", "form", "iframe",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub text: String,
}

/// Pull the main text (and a title) out of an HTML page. `None` when the page
/// has no readable text at all.
pub fn extract_article(html: &str) -> Option<ExtractedArticle> {
    let doc = Html::parse_document(html);

    let text = CONTENT_SELECTORS
        .iter()
        .chain(std::iter::once(&"body"))
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| {
            let text = doc.select(&sel).next().map(element_text)?;
            (!text.is_empty()).then_some(text)
        })?;

    Some(ExtractedArticle {
        title: page_title(&doc),
        text,
    })
}

/// `og:title`, else `<title>`.
fn page_title(doc: &Html) -> Option<String> {
    let og = Selector::parse(r#"meta[property="og:title"]"#).ok()?;
    let from_meta = doc
        .select(&og)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(collapse);
    let title = from_meta.filter(|t| !t.is_empty()).or_else(|| {
        let sel = Selector::parse("title").ok()?;
        doc.select(&sel)
            .next()
            .map(|t| collapse(&t.text().collect::<String>()))
    })?;
    (!title.is_empty()).then_some(title)
}

fn element_text(el: ElementRef) -> String {
    let mut parts = Vec::new();
    collect_text(el, &mut parts);
    let mut out = collapse(&parts.join(" "));
    if out.chars().count() > MAX_BODY_CHARS {
        out = out.chars().take(MAX_BODY_CHARS).collect();
    }
    out
}

fn collect_text(el: ElementRef, parts: &mut Vec<String>) {
    if SKIP_TAGS.contains(&el.value().name()) {
        return;
    }
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                let t = t.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, parts);
                }
            }
            _ => {}
        }
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
