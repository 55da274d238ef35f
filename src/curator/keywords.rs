//! Keyword-overlap relevance and categorization.
//!
//! Every category except the fallback owns a weighted keyword set. A separate
//! domain set (AI + AEC vocabulary) feeds relevance only, so generic AI terms
//! never pull an item into a specific category.
//!
//! - category  = argmax of raw category overlap; ties → source hint, else fallback
//! - relevance = min(1, (best category overlap + domain overlap) / saturation)

use std::collections::BTreeMap;

use crate::model::{Category, ContentItem};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceAssessment {
    pub category: Category,
    pub relevance: f32,
    /// Unnormalized overlap of the chosen category.
    pub category_overlap: f32,
}

/// Pluggable relevance scorer. The default is keyword overlap; an external
/// model only has to honour the same contract.
pub trait RelevanceModel: Send + Sync {
    fn assess(&self, item: &ContentItem, category_hint: Option<Category>) -> RelevanceAssessment;
}

#[derive(Debug, Clone)]
pub struct KeywordTable {
    pub categories: BTreeMap<Category, Vec<(String, f32)>>,
    pub domain: Vec<(String, f32)>,
}

impl KeywordTable {
    pub fn default_seed() -> Self {
        let mut categories = BTreeMap::new();
        let sets: [(Category, &[(&str, f32)]); 11] = [
            (
                Category::BimDigitalTwins,
                &[
                    ("bim", 3.0),
                    ("building information modeling", 3.0),
                    ("digital twin", 3.0),
                    ("digital twins", 3.0),
                    ("revit", 2.0),
                    ("3d model", 1.5),
                    ("point cloud", 1.5),
                    ("ifc", 1.5),
                ],
            ),
            (
                Category::ConstructionAutomation,
                &[
                    ("construction automation", 3.0),
                    ("automated", 1.5),
                    ("automation", 2.0),
                    ("machinery", 1.5),
                    ("equipment", 1.0),
                    ("prefabrication", 2.0),
                    ("modular construction", 2.0),
                ],
            ),
            (
                Category::AiDesignTools,
                &[
                    ("ai design", 3.0),
                    ("design ai", 3.0),
                    ("design tool", 2.0),
                    ("text to cad", 2.5),
                    ("rendering", 1.5),
                    ("copilot", 1.5),
                ],
            ),
            (
                Category::ParametricGenerativeDesign,
                &[
                    ("parametric", 3.0),
                    ("generative design", 3.0),
                    ("grasshopper", 2.0),
                    ("computational design", 2.5),
                    ("topology optimization", 2.0),
                ],
            ),
            (
                Category::SmartBuildingsIot,
                &[
                    ("iot", 3.0),
                    ("smart building", 3.0),
                    ("smart buildings", 3.0),
                    ("sensors", 2.0),
                    ("sensor", 2.0),
                    ("building automation", 2.0),
                    ("hvac", 1.5),
                ],
            ),
            (
                Category::ProjectManagementAi,
                &[
                    ("project management", 3.0),
                    ("scheduling", 2.0),
                    ("planning", 1.5),
                    ("coordination", 1.5),
                    ("cost estimation", 2.0),
                    ("risk management", 1.5),
                ],
            ),
            (
                Category::SustainabilityGreenTech,
                &[
                    ("sustainability", 3.0),
                    ("sustainable", 2.0),
                    ("carbon", 2.5),
                    ("embodied carbon", 3.0),
                    ("energy efficiency", 2.5),
                    ("green building", 2.5),
                    ("net zero", 2.5),
                ],
            ),
            (
                Category::RoboticsInConstruction,
                &[
                    ("robot", 3.0),
                    ("robots", 3.0),
                    ("robotics", 3.0),
                    ("autonomous", 2.0),
                    ("drone", 2.0),
                    ("drones", 2.0),
                    ("exoskeleton", 2.0),
                ],
            ),
            (
                Category::GovernmentPolicyAi,
                &[
                    ("policy", 2.5),
                    ("government", 2.5),
                    ("regulation", 2.5),
                    ("compliance", 2.0),
                    ("legislation", 2.5),
                    ("building code", 2.0),
                ],
            ),
            (
                Category::FinancialTechAec,
                &[
                    ("fintech", 3.0),
                    ("funding", 2.5),
                    ("investment", 2.5),
                    ("venture capital", 2.5),
                    ("raises", 2.0),
                    ("acquisition", 2.0),
                ],
            ),
            (
                Category::IndustryProductivity,
                &[
                    ("productivity", 3.0),
                    ("efficiency", 2.0),
                    ("workflow", 2.0),
                    ("optimization", 1.5),
                    ("labor shortage", 2.5),
                ],
            ),
        ];
        for (cat, words) in sets {
            categories.insert(
                cat,
                words.iter().map(|(k, w)| (k.to_string(), *w)).collect(),
            );
        }

        let domain = [
            ("artificial intelligence", 3.0),
            ("machine learning", 2.5),
            ("ai", 2.0),
            ("neural network", 2.5),
            ("deep learning", 2.5),
            ("computer vision", 2.5),
            ("llm", 2.5),
            ("generative ai", 2.5),
            ("algorithm", 1.5),
            ("predictive", 2.0),
            ("construction", 2.5),
            ("architecture", 2.0),
            ("engineering", 2.0),
            ("building", 2.0),
            ("infrastructure", 2.0),
            ("aec", 2.5),
            ("contractor", 1.5),
        ]
        .iter()
        .map(|(k, w)| (k.to_string(), *w))
        .collect();

        Self { categories, domain }
    }
}

/// Lowercased alphanumeric tokens padded with spaces, so `" kw "` matches whole words.
pub fn token_haystack(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let lowered = text.to_lowercase();
    let mut last_space = true;
    for ch in lowered.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Sum of weights of keywords present in `haystack` (each counted once).
pub fn overlap(haystack: &str, keywords: &[(String, f32)]) -> f32 {
    keywords
        .iter()
        .filter(|(k, _)| haystack.contains(&format!(" {k} ")))
        .map(|(_, w)| *w)
        .sum()
}

pub struct KeywordRelevance {
    table: KeywordTable,
    saturation: f32,
}

impl KeywordRelevance {
    pub fn new(table: KeywordTable, saturation: f32) -> Self {
        Self {
            table,
            saturation: saturation.max(1e-3),
        }
    }

    /// Raw overlap per category for `text`.
    pub fn category_overlaps(&self, text: &str) -> Vec<(Category, f32)> {
        let hay = token_haystack(text);
        self.table
            .categories
            .iter()
            .map(|(c, kws)| (*c, overlap(&hay, kws)))
            .collect()
    }
}

impl RelevanceModel for KeywordRelevance {
    fn assess(&self, item: &ContentItem, category_hint: Option<Category>) -> RelevanceAssessment {
        let text = format!("{} {}", item.title, item.body);
        let overlaps = self.category_overlaps(&text);
        let best = overlaps.iter().map(|(_, s)| *s).fold(0.0f32, f32::max);

        let leaders: Vec<Category> = overlaps
            .iter()
            .filter(|(_, s)| (*s - best).abs() < f32::EPSILON)
            .map(|(c, _)| *c)
            .collect();
        let category = match leaders.as_slice() {
            [only] if best > 0.0 => *only,
            _ => match category_hint {
                Some(h) if best <= 0.0 || leaders.contains(&h) => h,
                _ => Category::DEFAULT,
            },
        };

        let chosen = overlaps
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, s)| *s)
            .unwrap_or(0.0);
        let domain = overlap(&token_haystack(&text), &self.table.domain);
        let relevance = ((chosen + domain) / self.saturation).clamp(0.0, 1.0);

        RelevanceAssessment {
            category,
            relevance,
            category_overlap: chosen,
        }
    }
}
