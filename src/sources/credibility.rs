//! # Source credibility
//!
//! Maps a source (by id or feed host) to a trust weight in `[0.0, 1.0]`.
//!
//! - Loads from JSON (weights + aliases), falls back to `default_seed()`.
//! - Lookup order: alias → exact → substring of the feed host → default.
//! - Case-insensitive; punctuation and dashes are normalized away.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct CredibilityTable {
    #[serde(default = "default_default_weight")]
    pub default_weight: f32,
    /// Canonical publisher name → weight.
    #[serde(default)]
    pub weights: HashMap<String, f32>,
    /// Alternative spellings/domains → canonical name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f32 {
    0.50
}

impl Default for CredibilityTable {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl CredibilityTable {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Weight for a source identified by `source_id` and its feed `url`.
    pub fn weight_for(&self, source_id: &str, url: &str) -> f32 {
        let id = normalize(source_id);
        let host = normalize(&host_of(url));

        for key in [&id, &host] {
            if let Some(canon) = self.aliases.get(key) {
                if let Some(&w) = self.weights.get(&normalize(canon)) {
                    return w.clamp(0.0, 1.0);
                }
            }
        }

        if let Some(&w) = self.weights.get(&id) {
            return w.clamp(0.0, 1.0);
        }

        // Longest key wins so "construction dive" beats "construction".
        let mut best: Option<(&str, f32)> = None;
        for (k, &w) in &self.weights {
            if !k.is_empty()
                && (host.contains(k.as_str()) || id.contains(k.as_str()))
                && best.map_or(true, |(bk, _)| (k.len(), bk) > (bk.len(), k.as_str()))
            {
                best = Some((k.as_str(), w));
            }
        }
        if let Some((_, w)) = best {
            return w.clamp(0.0, 1.0);
        }

        self.default_weight.clamp(0.0, 1.0)
    }

    /// Built-in seed of AEC trade press and vendor newsrooms.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("aecmag", 0.90),
            ("archdaily", 0.85),
            ("dezeen", 0.85),
            ("engineering", 0.80),
            ("construction dive", 0.85),
            ("enr", 0.90),
            ("autodesk", 0.80),
            ("bentley", 0.80),
            ("trimble", 0.80),
            ("bimplus", 0.80),
            ("building design construction", 0.80),
            ("architects journal", 0.80),
            ("for construction pros", 0.70),
            ("medium", 0.40),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("aec magazine", "aecmag"),
            ("engineering news record", "enr"),
            ("constructiondive", "construction dive"),
            ("engineering com", "engineering"),
            ("bdcnetwork", "building design construction"),
            ("bd c", "building design construction"),
            ("architectsjournal", "architects journal"),
            ("aj", "architects journal"),
            ("forconstructionpros", "for construction pros"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: default_default_weight(),
            weights,
            aliases,
        }
    }
}

/// Host part of a URL without scheme, port, `www.` and TLD.
fn host_of(url: &str) -> String {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    match host.rsplit_once('.') {
        Some((name, _tld)) => name.to_string(),
        None => host.to_string(),
    }
}

/// Lowercase, punctuation and dashes to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();
    for ch in ['—', '–', '-', '_', '/', '\\', '&'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', '.', ',', '’', '\''], " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
