// src/model/item.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed content taxonomy. `GeneralAiInAec` is the fallback category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BimDigitalTwins,
    ConstructionAutomation,
    AiDesignTools,
    ParametricGenerativeDesign,
    SmartBuildingsIot,
    ProjectManagementAi,
    SustainabilityGreenTech,
    RoboticsInConstruction,
    GovernmentPolicyAi,
    FinancialTechAec,
    IndustryProductivity,
    GeneralAiInAec,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::BimDigitalTwins,
        Category::ConstructionAutomation,
        Category::AiDesignTools,
        Category::ParametricGenerativeDesign,
        Category::SmartBuildingsIot,
        Category::ProjectManagementAi,
        Category::SustainabilityGreenTech,
        Category::RoboticsInConstruction,
        Category::GovernmentPolicyAi,
        Category::FinancialTechAec,
        Category::IndustryProductivity,
        Category::GeneralAiInAec,
    ];

    pub const DEFAULT: Category = Category::GeneralAiInAec;

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::BimDigitalTwins => "bim_digital_twins",
            Category::ConstructionAutomation => "construction_automation",
            Category::AiDesignTools => "ai_design_tools",
            Category::ParametricGenerativeDesign => "parametric_generative_design",
            Category::SmartBuildingsIot => "smart_buildings_iot",
            Category::ProjectManagementAi => "project_management_ai",
            Category::SustainabilityGreenTech => "sustainability_green_tech",
            Category::RoboticsInConstruction => "robotics_in_construction",
            Category::GovernmentPolicyAi => "government_policy_ai",
            Category::FinancialTechAec => "financial_tech_aec",
            Category::IndustryProductivity => "industry_productivity",
            Category::GeneralAiInAec => "general_ai_in_aec",
        }
    }

    /// Human-readable section heading.
    pub fn title(&self) -> &'static str {
        match self {
            Category::BimDigitalTwins => "BIM & Digital Twins",
            Category::ConstructionAutomation => "Construction Automation",
            Category::AiDesignTools => "AI Design Tools",
            Category::ParametricGenerativeDesign => "Parametric & Generative Design",
            Category::SmartBuildingsIot => "Smart Buildings & IoT",
            Category::ProjectManagementAi => "Project Management AI",
            Category::SustainabilityGreenTech => "Sustainability & Green Tech",
            Category::RoboticsInConstruction => "Robotics in Construction",
            Category::GovernmentPolicyAi => "Government & Policy AI",
            Category::FinancialTechAec => "Financial Tech in AEC",
            Category::IndustryProductivity => "Industry Productivity",
            Category::GeneralAiInAec => "General AI in AEC",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == key)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessImpact {
    Low,
    Medium,
    High,
}

impl BusinessImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessImpact::Low => "low",
            BusinessImpact::Medium => "medium",
            BusinessImpact::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Discovered,
    Curated,
    Rejected,
    Selected,
    Archived,
}

/// Why the curator excluded an item from newsletter candidacy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RejectReason {
    BelowQualityThreshold,
    BelowRelevanceThreshold,
    NearDuplicateOf(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::BelowQualityThreshold => f.write_str("below_quality_threshold"),
            RejectReason::BelowRelevanceThreshold => f.write_str("below_relevance_threshold"),
            RejectReason::NearDuplicateOf(id) => write!(f, "near_duplicate_of:{id}"),
        }
    }
}

impl From<RejectReason> for String {
    fn from(r: RejectReason) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for RejectReason {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "below_quality_threshold" => Ok(RejectReason::BelowQualityThreshold),
            "below_relevance_threshold" => Ok(RejectReason::BelowRelevanceThreshold),
            other => other
                .strip_prefix("near_duplicate_of:")
                .filter(|id| !id.is_empty())
                .map(|id| RejectReason::NearDuplicateOf(id.to_string()))
                .ok_or_else(|| format!("unknown reject reason '{other}'")),
        }
    }
}

impl RejectReason {
    /// Metrics label (drops the referenced id).
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::BelowQualityThreshold => "below_quality_threshold",
            RejectReason::BelowRelevanceThreshold => "below_relevance_threshold",
            RejectReason::NearDuplicateOf(_) => "near_duplicate",
        }
    }
}

/// A discovered article/post with scoring and lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Derived from `dedup_hash`; equal hashes mean the same logical item.
    pub id: String,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub discovered_at: DateTime<Utc>,
    pub dedup_hash: String,
    /// How many times discovery has seen this item (1 on creation).
    pub occurrences: u32,
    pub quality_score: Option<f32>,
    pub relevance_score: Option<f32>,
    pub category: Option<Category>,
    pub business_impact: Option<BusinessImpact>,
    pub status: ItemStatus,
    #[serde(default)]
    pub rejection: Option<RejectReason>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Members of this item's near-duplicate cluster, itself included. Set on the cluster winner.
    #[serde(default)]
    pub cluster_size: u32,
}

impl ContentItem {
    /// Freshly discovered item; scoring fields stay empty until curation.
    pub fn discovered(
        source_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        published_at: DateTime<Utc>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        let title = title.into();
        let dedup_hash = crate::scout::dedup::dedup_hash(&url, &title);
        Self {
            id: crate::scout::dedup::item_id(&dedup_hash),
            source_id: source_id.into(),
            url,
            title,
            body: body.into(),
            published_at,
            discovered_at,
            dedup_hash,
            occurrences: 1,
            quality_score: None,
            relevance_score: None,
            category: None,
            business_impact: None,
            status: ItemStatus::Discovered,
            rejection: None,
            tags: Vec::new(),
            summary: None,
            cluster_size: 0,
        }
    }

    /// `quality * relevance`, 0 when either score is missing.
    pub fn combined_score(&self) -> f32 {
        self.quality_score.unwrap_or(0.0) * self.relevance_score.unwrap_or(0.0)
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self.status, ItemStatus::Curated | ItemStatus::Selected)
    }
}
