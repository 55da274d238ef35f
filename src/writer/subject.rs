//! Subject-line variants for external A/B selection.
//!
//! Candidates come from fixed templates, are shuffled by a generator seeded
//! from `(subject_seed, period_key)`, then stably ordered by effectiveness
//! score. Same seed + key + inputs → same list.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use sha2::{Digest, Sha256};

use crate::model::{BusinessImpact, ContentItem, NewsletterMetrics};

pub const MAX_VARIANTS: usize = 5;

const POWER_WORDS: [&str; 10] = [
    "breakthrough",
    "exclusive",
    "urgent",
    "breaking",
    "revolutionary",
    "game-changing",
    "must-read",
    "critical",
    "major",
    "insider",
];

const URGENCY_WORDS: [&str; 5] = ["this week", "today", "now", "latest", "new"];

const TOPIC_KEYWORDS: [&str; 9] = [
    "artificial intelligence",
    "machine learning",
    "digital twin",
    "smart building",
    "automation",
    "robotics",
    "BIM",
    "IoT",
    "AI",
];

/// Effectiveness score in [0,100]: length band, power words, digits,
/// urgency, question form, personalization.
pub fn score_subject(subject: &str) -> u32 {
    let lower = subject.to_lowercase();
    let len = subject.chars().count();
    let mut score = match len {
        30..=50 => 20,
        20..=29 | 51..=60 => 15,
        _ => 5,
    };
    score += 10 * POWER_WORDS.iter().filter(|w| lower.contains(*w)).count() as u32;
    if subject.chars().any(|c| c.is_ascii_digit()) {
        score += 15;
    }
    score += 5 * URGENCY_WORDS.iter().filter(|w| lower.contains(*w)).count() as u32;
    if subject.ends_with('?') {
        score += 10;
    }
    if lower.contains("your") {
        score += 5;
    }
    score.min(100)
}

/// Generator seed for a period.
pub fn seed_for(period_key: &str, subject_seed: u64) -> u64 {
    let digest = Sha256::digest(period_key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes) ^ subject_seed
}

/// Key topic of a title: first known technology keyword, else first long word.
fn key_topic(title: &str) -> String {
    let lower = title.to_lowercase();
    if let Some(k) = TOPIC_KEYWORDS
        .iter()
        .find(|k| format!(" {lower} ").contains(&format!(" {} ", k.to_lowercase())))
    {
        return k.to_string();
    }
    title
        .split_whitespace()
        .find(|w| w.len() > 4 && !matches!(w.to_lowercase().as_str(), "this" | "that" | "with" | "from"))
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "Technology".to_string())
}

pub fn subject_variants(
    period_key: &str,
    subject_seed: u64,
    ranked: &[ContentItem],
    metrics: &NewsletterMetrics,
) -> Vec<String> {
    let span = if period_key.contains("-W") { "week" } else { "issue" };
    let high = metrics.high_impact_articles;
    let innovation = ranked
        .iter()
        .filter(|it| it.business_impact == Some(BusinessImpact::High))
        .filter(|it| {
            let t = format!(" {} ", it.title.to_lowercase());
            t.contains(" ai ") || t.contains("artificial intelligence") || t.contains("automation")
        })
        .count();
    let topic = ranked
        .first()
        .map(|it| key_topic(&it.title))
        .unwrap_or_else(|| "Technology".to_string());

    let mut candidates = vec![
        format!("{NAME}: {} curated insights", metrics.total_articles, NAME = super::render::NEWSLETTER_NAME),
        format!("What's revolutionizing construction this {span}?"),
        format!("Your competitive edge: {period_key} AEC intel"),
        format!("Breaking: {topic} leads this {span}'s AEC AI news"),
        format!("Your {span}ly AEC AI intelligence briefing"),
    ];
    if high >= 3 {
        candidates.push(format!("{high} game-changing AEC developments you can't miss"));
    }
    if innovation >= 2 {
        candidates.push(format!(
            "AI revolution in AEC: {innovation} major breakthroughs this {span}"
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed_for(period_key, subject_seed));
    candidates.shuffle(&mut rng);
    // Stable: equal scores keep their shuffled order.
    candidates.sort_by_key(|s| std::cmp::Reverse(score_subject(s)));
    candidates.dedup();
    candidates.truncate(MAX_VARIANTS);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(total: usize, high: usize) -> NewsletterMetrics {
        NewsletterMetrics {
            total_articles: total,
            high_impact_articles: high,
            categories_covered: 2,
            estimated_read_minutes: 3,
            quality_score_avg: 0.8,
        }
    }

    #[test]
    fn scoring_rewards_known_signals() {
        assert!(score_subject("5 major breakthroughs this week") > score_subject("hello"));
        assert!(score_subject("What's new today?") > score_subject("What's new today"));
        assert!(score_subject(&"x".repeat(200)) <= 100);
    }

    #[test]
    fn variants_are_deterministic_and_ordered() {
        let m = metrics(12, 4);
        let a = subject_variants("2024-W03", 7, &[], &m);
        let b = subject_variants("2024-W03", 7, &[], &m);
        assert_eq!(a, b);
        assert!(a.len() <= MAX_VARIANTS && !a.is_empty());
        let scores: Vec<u32> = a.iter().map(|s| score_subject(s)).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn seed_depends_on_period_key() {
        assert_ne!(seed_for("2024-W03", 1), seed_for("2024-W04", 1));
        assert_ne!(seed_for("2024-W03", 1), seed_for("2024-W03", 2));
    }
}
