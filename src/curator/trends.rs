//! Trend report over recently curated items.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::model::{Category, ContentItem, ItemStatus};

/// How many tags the report lists.
pub const TOP_TAGS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSignal {
    pub item_id: String,
    pub title: String,
    pub cluster_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub since: DateTime<Utc>,
    pub total_items: usize,
    /// Most frequent first.
    pub categories: Vec<CategoryCount>,
    /// Categories above 1.5x their even share.
    pub trending_categories: Vec<Category>,
    pub top_tags: Vec<TagCount>,
    /// Multi-member near-duplicate clusters, largest first.
    pub clusters: Vec<ClusterSignal>,
}

/// Summarize curated/selected items discovered at or after `since`.
pub fn detect_trends(items: &[ContentItem], since: DateTime<Utc>) -> TrendReport {
    let recent: Vec<&ContentItem> = items
        .iter()
        .filter(|it| matches!(it.status, ItemStatus::Curated | ItemStatus::Selected))
        .filter(|it| it.discovered_at >= since)
        .collect();

    let mut by_cat: BTreeMap<Category, usize> = BTreeMap::new();
    let mut tags: HashMap<&str, usize> = HashMap::new();
    for it in &recent {
        *by_cat.entry(it.category.unwrap_or(Category::DEFAULT)).or_default() += 1;
        for t in &it.tags {
            *tags.entry(t.as_str()).or_default() += 1;
        }
    }

    let mut categories: Vec<CategoryCount> = by_cat
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();
    categories.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));

    let even_share = recent.len() as f64 / Category::ALL.len() as f64;
    let trending_categories = categories
        .iter()
        .filter(|c| !recent.is_empty() && c.count as f64 > even_share * 1.5)
        .map(|c| c.category)
        .collect();

    let mut top_tags: Vec<TagCount> = tags
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    top_tags.truncate(TOP_TAGS);

    let mut clusters: Vec<ClusterSignal> = recent
        .iter()
        .filter(|it| it.cluster_size > 1)
        .map(|it| ClusterSignal {
            item_id: it.id.clone(),
            title: it.title.clone(),
            cluster_size: it.cluster_size,
        })
        .collect();
    clusters.sort_by(|a, b| {
        b.cluster_size
            .cmp(&a.cluster_size)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    TrendReport {
        since,
        total_items: recent.len(),
        categories,
        trending_categories,
        top_tags,
        clusters,
    }
}
