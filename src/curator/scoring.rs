//! Quality score: weighted mean of readability, source credibility and
//! freshness, each in [0,1].
//!
//! quality = (w_r*readability + w_c*credibility + w_f*freshness) / (w_r + w_c + w_f)

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityWeights {
    pub w_readability: f32,
    pub w_credibility: f32,
    pub w_freshness: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            w_readability: 0.3,
            w_credibility: 0.4,
            w_freshness: 0.3,
        }
    }
}

/// Normalized inputs in [0,1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QualityInputs {
    pub readability: f32,
    pub credibility: f32,
    pub freshness: f32,
}

impl QualityInputs {
    /// Safe constructor with clamping.
    pub fn new(readability: f32, credibility: f32, freshness: f32) -> Self {
        fn c(x: f32) -> f32 {
            if x.is_nan() {
                0.0
            } else {
                x.clamp(0.0, 1.0)
            }
        }
        Self {
            readability: c(readability),
            credibility: c(credibility),
            freshness: c(freshness),
        }
    }
}

pub fn quality_score(inputs: &QualityInputs, w: &QualityWeights) -> f32 {
    let raw = inputs.readability * w.w_readability
        + inputs.credibility * w.w_credibility
        + inputs.freshness * w.w_freshness;
    let denom = (w.w_readability + w.w_credibility + w.w_freshness).max(1e-6);
    (raw / denom).clamp(0.0, 1.0)
}

/// Linear decay: 1 at publication, 0 at (and beyond) the window boundary.
pub fn freshness_decay(published_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> f32 {
    let window_secs = window.as_secs_f64();
    if window_secs <= 0.0 {
        return 0.0;
    }
    let age = now.signed_duration_since(published_at).num_milliseconds() as f64 / 1000.0;
    let age = age.max(0.0);
    (1.0 - age / window_secs).clamp(0.0, 1.0) as f32
}

/// Simplified Flesch reading ease mapped to [0,1]. Empty text scores 0.
pub fn readability(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    let avg_sentence_len = words.len() as f64 / sentences as f64;
    let avg_syllables = syllables as f64 / words.len() as f64;
    let score = 206.835 - 1.015 * avg_sentence_len - 84.6 * avg_syllables;
    (score / 100.0).clamp(0.0, 1.0) as f32
}

fn count_syllables(word: &str) -> usize {
    let w = word.to_lowercase();
    let mut n = 0;
    let mut prev_vowel = false;
    for ch in w.chars() {
        let vowel = matches!(ch, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !prev_vowel {
            n += 1;
        }
        prev_vowel = vowel;
    }
    if w.ends_with('e') && n > 1 {
        n -= 1;
    }
    n.max(1)
}
