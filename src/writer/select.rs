//! Candidate ranking and sectioning.

use std::cmp::Ordering;

use crate::model::{BusinessImpact, Category, ContentItem, Section, SectionEntry};

/// Total order: impact desc, quality*relevance desc, newest first, id asc.
pub fn rank_order(a: &ContentItem, b: &ContentItem) -> Ordering {
    let impact = |it: &ContentItem| it.business_impact.unwrap_or(BusinessImpact::Low);
    impact(b)
        .cmp(&impact(a))
        .then_with(|| {
            b.combined_score()
                .partial_cmp(&a.combined_score())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Top `max_items` candidates in rank order.
pub fn select_top(pool: &[ContentItem], max_items: usize) -> Vec<ContentItem> {
    let mut ranked: Vec<ContentItem> = pool.iter().filter(|it| it.is_candidate()).cloned().collect();
    ranked.sort_by(rank_order);
    ranked.truncate(max_items);
    ranked
}

/// Group ranked items by category; sections appear in order of their best item.
pub fn group_sections(ranked: &[ContentItem]) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for it in ranked {
        let category = it.category.unwrap_or(Category::DEFAULT);
        let entry = SectionEntry {
            item_id: it.id.clone(),
            title: it.title.clone(),
            url: it.url.clone(),
            summary: it.summary.clone().unwrap_or_default(),
            business_impact: it.business_impact.unwrap_or(BusinessImpact::Low),
            quality_score: it.quality_score.unwrap_or(0.0),
            relevance_score: it.relevance_score.unwrap_or(0.0),
        };
        match sections.iter_mut().find(|s| s.category == category) {
            Some(s) => s.entries.push(entry),
            None => sections.push(Section {
                category,
                heading: category.title().to_string(),
                entries: vec![entry],
            }),
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemStatus;
    use chrono::Utc;

    fn cand(n: u32, impact: BusinessImpact, q: f32, cat: Category) -> ContentItem {
        let now = Utc::now();
        let mut it = ContentItem::discovered("s", format!("https://x.test/{n}"), format!("T{n}"), "", now, now);
        it.status = ItemStatus::Curated;
        it.business_impact = Some(impact);
        it.quality_score = Some(q);
        it.relevance_score = Some(1.0);
        it.category = Some(cat);
        it
    }

    #[test]
    fn impact_outranks_score() {
        let pool = vec![
            cand(1, BusinessImpact::Medium, 0.99, Category::BimDigitalTwins),
            cand(2, BusinessImpact::High, 0.60, Category::RoboticsInConstruction),
            cand(3, BusinessImpact::High, 0.80, Category::BimDigitalTwins),
        ];
        let top = select_top(&pool, 2);
        assert_eq!(top.iter().map(|i| i.title.as_str()).collect::<Vec<_>>(), ["T3", "T2"]);
    }

    #[test]
    fn rejected_items_are_never_selected() {
        let mut r = cand(1, BusinessImpact::High, 0.9, Category::BimDigitalTwins);
        r.status = ItemStatus::Rejected;
        assert!(select_top(&[r], 10).is_empty());
    }

    #[test]
    fn sections_follow_best_item_order() {
        let pool = vec![
            cand(1, BusinessImpact::High, 0.9, Category::RoboticsInConstruction),
            cand(2, BusinessImpact::High, 0.8, Category::BimDigitalTwins),
            cand(3, BusinessImpact::Medium, 0.9, Category::RoboticsInConstruction),
        ];
        let sections = group_sections(&select_top(&pool, 10));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].category, Category::RoboticsInConstruction);
        assert_eq!(sections[0].entries.len(), 2);
    }
}
