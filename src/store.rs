//! Persistence collaborator.
//!
//! The pipeline only needs key-based reads/writes and a few queries, so the
//! store is a trait; `MemoryStore` keeps everything in process behind one
//! `RwLock`, which also makes curation merges and pool snapshots atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::error::{PipelineError, Result};
use crate::model::{ContentItem, ItemStatus, NewsletterArtifact, Source};

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// The id already existed; its occurrence counter is now `occurrences`.
    Duplicate { occurrences: u32 },
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new item, or bump the occurrence counter of the existing one.
    async fn insert_item(&self, item: ContentItem) -> Result<InsertOutcome>;
    /// Bump the occurrence counter of an existing item. `None` if unknown.
    async fn record_occurrence(&self, id: &str) -> Result<Option<u32>>;
    async fn get_item(&self, id: &str) -> Result<Option<ContentItem>>;
    /// Known items in request order; unknown ids are skipped.
    async fn get_items(&self, ids: &[String]) -> Result<Vec<ContentItem>>;
    /// Merge curation results in one step. Only the scoring fields and status
    /// are copied, and only onto items still `discovered`; occurrence counts and
    /// concurrent archival are never overwritten. Returns the ids applied.
    async fn apply_curation(&self, items: Vec<ContentItem>) -> Result<Vec<String>>;
    /// Point-in-time copy of every curated item.
    async fn candidate_pool(&self) -> Result<Vec<ContentItem>>;
    async fn items_by_status(&self, status: ItemStatus) -> Result<Vec<ContentItem>>;
    /// Set items in `ids` from curated to selected.
    async fn mark_selected(&self, ids: &[String]) -> Result<()>;
    /// Archive every non-archived item discovered before `cutoff`. Returns the count.
    async fn archive_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Store an artifact; fails with `DuplicateArtifact` if its period key exists.
    async fn put_artifact(&self, artifact: NewsletterArtifact) -> Result<()>;
    async fn get_artifact(&self, period_key: &str) -> Result<Option<NewsletterArtifact>>;

    async fn put_source(&self, source: Source) -> Result<()>;
    async fn list_sources(&self) -> Result<Vec<Source>>;
}

#[derive(Default)]
struct Inner {
    items: HashMap<String, ContentItem>,
    artifacts: HashMap<String, NewsletterArtifact>,
    sources: BTreeMap<String, Source>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.inner.read().items.len()
    }
}

fn sorted(mut v: Vec<ContentItem>) -> Vec<ContentItem> {
    v.sort_by(|a, b| a.id.cmp(&b.id));
    v
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_item(&self, item: ContentItem) -> Result<InsertOutcome> {
        let mut g = self.inner.write();
        if let Some(existing) = g.items.get_mut(&item.id) {
            existing.occurrences = existing.occurrences.saturating_add(1);
            return Ok(InsertOutcome::Duplicate {
                occurrences: existing.occurrences,
            });
        }
        g.items.insert(item.id.clone(), item);
        Ok(InsertOutcome::Inserted)
    }

    async fn record_occurrence(&self, id: &str) -> Result<Option<u32>> {
        let mut g = self.inner.write();
        Ok(g.items.get_mut(id).map(|it| {
            it.occurrences = it.occurrences.saturating_add(1);
            it.occurrences
        }))
    }

    async fn get_item(&self, id: &str) -> Result<Option<ContentItem>> {
        Ok(self.inner.read().items.get(id).cloned())
    }

    async fn get_items(&self, ids: &[String]) -> Result<Vec<ContentItem>> {
        let g = self.inner.read();
        Ok(ids.iter().filter_map(|id| g.items.get(id).cloned()).collect())
    }

    async fn apply_curation(&self, items: Vec<ContentItem>) -> Result<Vec<String>> {
        let mut g = self.inner.write();
        let mut applied = Vec::with_capacity(items.len());
        for it in items {
            let Some(stored) = g.items.get_mut(&it.id) else {
                continue;
            };
            if stored.status != ItemStatus::Discovered {
                continue;
            }
            stored.quality_score = it.quality_score;
            stored.relevance_score = it.relevance_score;
            stored.category = it.category;
            stored.business_impact = it.business_impact;
            stored.tags = it.tags;
            stored.summary = it.summary;
            stored.cluster_size = it.cluster_size;
            stored.status = it.status;
            stored.rejection = it.rejection;
            applied.push(it.id);
        }
        Ok(applied)
    }

    async fn candidate_pool(&self) -> Result<Vec<ContentItem>> {
        self.items_by_status(ItemStatus::Curated).await
    }

    async fn items_by_status(&self, status: ItemStatus) -> Result<Vec<ContentItem>> {
        let g = self.inner.read();
        Ok(sorted(
            g.items
                .values()
                .filter(|it| it.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn mark_selected(&self, ids: &[String]) -> Result<()> {
        let mut g = self.inner.write();
        for id in ids {
            if let Some(it) = g.items.get_mut(id) {
                if it.status == ItemStatus::Curated {
                    it.status = ItemStatus::Selected;
                }
            }
        }
        Ok(())
    }

    async fn archive_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut g = self.inner.write();
        let mut n = 0;
        for it in g.items.values_mut() {
            if it.status != ItemStatus::Archived && it.discovered_at < cutoff {
                it.status = ItemStatus::Archived;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn put_artifact(&self, artifact: NewsletterArtifact) -> Result<()> {
        let mut g = self.inner.write();
        if g.artifacts.contains_key(&artifact.period_key) {
            return Err(PipelineError::DuplicateArtifact(artifact.period_key));
        }
        g.artifacts.insert(artifact.period_key.clone(), artifact);
        Ok(())
    }

    async fn get_artifact(&self, period_key: &str) -> Result<Option<NewsletterArtifact>> {
        Ok(self.inner.read().artifacts.get(period_key).cloned())
    }

    async fn put_source(&self, source: Source) -> Result<()> {
        self.inner
            .write()
            .sources
            .insert(source.source_id.clone(), source);
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.inner.read().sources.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(url: &str, title: &str, age_days: i64) -> ContentItem {
        let now = Utc::now();
        ContentItem::discovered(
            "src",
            url,
            title,
            "body",
            now,
            now - Duration::days(age_days),
        )
    }

    #[tokio::test]
    async fn second_insert_bumps_occurrences() {
        let s = MemoryStore::new();
        let a = item("https://x.test/a", "A", 0);
        assert_eq!(s.insert_item(a.clone()).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            s.insert_item(a.clone()).await.unwrap(),
            InsertOutcome::Duplicate { occurrences: 2 }
        );
        assert_eq!(s.item_count(), 1);
        assert_eq!(s.record_occurrence(&a.id).await.unwrap(), Some(3));
        assert_eq!(s.record_occurrence("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn curation_merge_keeps_counters_and_skips_settled_items() {
        let s = MemoryStore::new();
        let a = item("https://x.test/a", "A", 0);
        let old = item("https://x.test/old", "Old", 40);
        s.insert_item(a.clone()).await.unwrap();
        s.insert_item(old.clone()).await.unwrap();

        // Sighted again and archived after the curator read its copies.
        s.record_occurrence(&a.id).await.unwrap();
        s.archive_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();

        let mut scored_a = a.clone();
        scored_a.status = ItemStatus::Curated;
        scored_a.quality_score = Some(0.8);
        scored_a.body = "rewritten".into();
        let mut scored_old = old.clone();
        scored_old.status = ItemStatus::Curated;
        let ghost = item("https://x.test/ghost", "Ghost", 0);

        let applied = s
            .apply_curation(vec![scored_a, scored_old, ghost])
            .await
            .unwrap();
        assert_eq!(applied, vec![a.id.clone()]);

        let stored = s.get_item(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Curated);
        assert_eq!(stored.quality_score, Some(0.8));
        assert_eq!(stored.occurrences, 2);
        assert_eq!(stored.body, "body");
        assert_eq!(
            s.get_item(&old.id).await.unwrap().unwrap().status,
            ItemStatus::Archived
        );
        assert_eq!(s.item_count(), 2);
    }

    #[tokio::test]
    async fn archive_uses_discovery_time() {
        let s = MemoryStore::new();
        s.insert_item(item("https://x.test/old", "Old", 40)).await.unwrap();
        s.insert_item(item("https://x.test/new", "New", 1)).await.unwrap();
        let n = s
            .archive_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(s.items_by_status(ItemStatus::Archived).await.unwrap().len(), 1);
    }
}
