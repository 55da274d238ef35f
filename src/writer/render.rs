//! HTML and plain-text encodings of one newsletter.
//!
//! Both renderers walk the same `Section` data in the same order, so the two
//! bodies always carry the same articles. Nothing time-dependent is rendered.

use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write as _;

use crate::model::{ExecutiveSummary, NewsletterMetrics, Section};

pub const NEWSLETTER_NAME: &str = "AEC AI Weekly";

/// Read-only view over the parts both encodings render.
pub struct RenderInput<'a> {
    pub period_key: &'a str,
    pub summary: &'a ExecutiveSummary,
    pub sections: &'a [Section],
    pub metrics: &'a NewsletterMetrics,
}

pub fn render_html(input: &RenderInput<'_>) -> String {
    let mut out = String::with_capacity(4096);
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{name} {key}</title>\n</head>\n<body>\n",
        name = NEWSLETTER_NAME,
        key = encode_text(input.period_key),
    );
    let _ = write!(
        out,
        "<header>\n<h1>{}</h1>\n<p class=\"meta\">{} · {} min read</p>\n</header>\n",
        NEWSLETTER_NAME,
        encode_text(input.period_key),
        input.metrics.estimated_read_minutes
    );

    out.push_str("<section class=\"summary\">\n<h2>Executive Summary</h2>\n");
    let _ = writeln!(out, "<p>{}</p>", encode_text(&input.summary.overview));
    if !input.summary.highlights.is_empty() {
        out.push_str("<ul>\n");
        for h in &input.summary.highlights {
            let _ = writeln!(out, "<li>{}</li>", encode_text(h));
        }
        out.push_str("</ul>\n");
    }
    out.push_str("</section>\n");

    for section in input.sections {
        let _ = writeln!(
            out,
            "<section class=\"category\" id=\"{}\">\n<h2>{}</h2>",
            section.category.as_str(),
            encode_text(&section.heading)
        );
        for e in &section.entries {
            let _ = writeln!(
                out,
                "<article class=\"impact-{impact}\">\n<h3><a href=\"{url}\">{title}</a></h3>\n<p class=\"impact\">{label} impact</p>",
                impact = e.business_impact.as_str(),
                url = encode_double_quoted_attribute(&e.url),
                title = encode_text(&e.title),
                label = e.business_impact.as_str().to_uppercase(),
            );
            if !e.summary.is_empty() {
                let _ = writeln!(out, "<p>{}</p>", encode_text(&e.summary));
            }
            out.push_str("</article>\n");
        }
        out.push_str("</section>\n");
    }

    let m = input.metrics;
    let _ = write!(
        out,
        "<footer>\n<p>{} articles · {} high impact · {} categories · quality {:.2}</p>\n</footer>\n</body>\n</html>\n",
        m.total_articles, m.high_impact_articles, m.categories_covered, m.quality_score_avg
    );
    out
}

pub fn render_text(input: &RenderInput<'_>) -> String {
    let mut out = String::with_capacity(2048);
    let _ = writeln!(out, "{} {}", NEWSLETTER_NAME.to_uppercase(), input.period_key);
    let _ = writeln!(out, "{} min read", input.metrics.estimated_read_minutes);
    out.push('\n');

    out.push_str("EXECUTIVE SUMMARY\n=================\n");
    let _ = writeln!(out, "{}", input.summary.overview);
    for h in &input.summary.highlights {
        let _ = writeln!(out, "- {h}");
    }
    out.push('\n');

    for section in input.sections {
        let heading = section.heading.to_uppercase();
        let _ = writeln!(out, "{heading}\n{}", "=".repeat(heading.chars().count()));
        for (i, e) in section.entries.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. [{} IMPACT] {}",
                i + 1,
                e.business_impact.as_str().to_uppercase(),
                e.title
            );
            if !e.summary.is_empty() {
                let _ = writeln!(out, "   {}", e.summary);
            }
            let _ = writeln!(out, "   Read more: {}", e.url);
        }
        out.push('\n');
    }

    let m = input.metrics;
    let _ = writeln!(
        out,
        "---\n{} articles | {} high impact | {} categories | quality {:.2}",
        m.total_articles, m.high_impact_articles, m.categories_covered, m.quality_score_avg
    );
    out
}
