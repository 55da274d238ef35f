//! Near-duplicate clustering within a curation batch.
//!
//! Greedy leader clustering: members are visited best-first (combined score
//! desc, id asc); each joins the first leader it is similar enough to, or
//! becomes a leader itself. Leaders stay curated, members are rejected with
//! `near_duplicate_of:<leader id>`.

use std::cmp::Ordering;

use crate::model::{ContentItem, ItemStatus, RejectReason};
use crate::scout::dedup::normalize_title;

/// Body prefix compared, in chars.
const BODY_PREFIX: usize = 1_000;

/// Max of title edit similarity and body bigram similarity, in [0,1].
pub fn similarity(a: &ContentItem, b: &ContentItem) -> f32 {
    let title = strsim::normalized_levenshtein(&normalize_title(&a.title), &normalize_title(&b.title));
    let body = if a.body.is_empty() || b.body.is_empty() {
        0.0
    } else {
        let pa: String = a.body.to_lowercase().chars().take(BODY_PREFIX).collect();
        let pb: String = b.body.to_lowercase().chars().take(BODY_PREFIX).collect();
        strsim::sorensen_dice(&pa, &pb)
    };
    title.max(body) as f32
}

/// Best-first order used for clustering and tie-breaks.
pub fn by_score_desc(a: &ContentItem, b: &ContentItem) -> Ordering {
    b.combined_score()
        .partial_cmp(&a.combined_score())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

/// Cluster the curated items of `batch` in place. Non-curated items are untouched.
/// Returns the number of items rejected as near duplicates.
pub fn cluster_near_duplicates(batch: &mut [ContentItem], threshold: f32) -> usize {
    let mut order: Vec<usize> = (0..batch.len())
        .filter(|&i| batch[i].status == ItemStatus::Curated)
        .collect();
    order.sort_by(|&i, &j| by_score_desc(&batch[i], &batch[j]));

    let mut leaders: Vec<usize> = Vec::new();
    let mut rejected = 0;
    for i in order {
        let leader = leaders
            .iter()
            .copied()
            .find(|&l| similarity(&batch[l], &batch[i]) > threshold);
        match leader {
            Some(l) => {
                let leader_id = batch[l].id.clone();
                batch[l].cluster_size += 1;
                let member = &mut batch[i];
                member.status = ItemStatus::Rejected;
                member.rejection = Some(RejectReason::NearDuplicateOf(leader_id));
                member.cluster_size = 0;
                rejected += 1;
            }
            None => {
                batch[i].cluster_size = 1;
                leaders.push(i);
            }
        }
    }
    rejected
}
