//! Exact-duplicate detection.
//!
//! The dedup hash is SHA-256 over the normalized URL and title, so the same
//! article reached via tracking links, `www.`/scheme variants or retitled
//! casing collapses to one item.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::time::Duration;
use tokio::time::Instant;

const TRACKING_PARAMS: [&str; 6] = ["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "source"];

/// Canonical URL: no scheme, lowercase host without `www.`, no fragment,
/// no tracking params, no trailing slash.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(parsed) = reqwest::Url::parse(trimmed) else {
        return trimmed.to_ascii_lowercase();
    };

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut out = host;
    if let Some(port) = parsed.port() {
        let _ = write!(&mut out, ":{port}");
    }
    out.push_str(parsed.path().trim_end_matches('/'));

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        out.push('?');
        let q = kept
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        out.push_str(&q);
    }
    out
}

/// Lowercase, entities decoded, punctuation dropped, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    let decoded = html_escape::decode_html_entities(title).to_lowercase();
    decoded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn dedup_hash(url: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_url(url).as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_title(title).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Item ids are the first 16 hex chars of the dedup hash.
pub fn item_id(dedup_hash: &str) -> String {
    dedup_hash.chars().take(16).collect()
}

/// Recently seen hashes, bounded by TTL and capacity.
#[derive(Debug)]
pub struct DedupWindow {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

impl DedupWindow {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `hash`. Returns `false` if it was already seen within the TTL.
    pub fn insert(&mut self, hash: &str, now: Instant) -> bool {
        self.evict(now);
        if self.seen.contains_key(hash) {
            return false;
        }
        while self.seen.len() >= self.capacity {
            match self.order.pop_front() {
                Some((h, at)) => {
                    if self.seen.get(&h) == Some(&at) {
                        self.seen.remove(&h);
                    }
                }
                None => break,
            }
        }
        self.seen.insert(hash.to_string(), now);
        self.order.push_back((hash.to_string(), now));
        true
    }

    pub fn contains(&self, hash: &str, now: Instant) -> bool {
        self.seen
            .get(hash)
            .is_some_and(|at| now.duration_since(*at) < self.ttl)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        while let Some((h, at)) = self.order.front() {
            if now.duration_since(*at) < self.ttl {
                break;
            }
            if self.seen.get(h) == Some(at) {
                self.seen.remove(h);
            }
            self.order.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_variants_share_a_hash() {
        let a = dedup_hash(
            "https://www.AECmag.com/bim/robots-on-site/?utm_source=rss#comments",
            "Robots on Site: What's Next?",
        );
        let b = dedup_hash("http://aecmag.com/bim/robots-on-site", "robots on site  what&#39;s next");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(item_id(&a).len(), 16);
    }

    #[test]
    fn meaningful_query_params_are_kept() {
        assert_ne!(
            normalize_url("https://x.test/article?id=1"),
            normalize_url("https://x.test/article?id=2")
        );
    }

    #[test]
    fn different_titles_differ() {
        assert_ne!(
            dedup_hash("https://x.test/a", "Digital twins at scale"),
            dedup_hash("https://x.test/a", "Digital twins in practice")
        );
    }

    #[test]
    fn window_expires_after_ttl() {
        let t0 = Instant::now();
        let mut w = DedupWindow::new(Duration::from_secs(10), 100);
        assert!(w.insert("h1", t0));
        assert!(!w.insert("h1", t0 + Duration::from_secs(5)));
        assert!(w.insert("h1", t0 + Duration::from_secs(11)));
    }

    #[test]
    fn window_is_capacity_bounded() {
        let t0 = Instant::now();
        let mut w = DedupWindow::new(Duration::from_secs(60), 2);
        w.insert("a", t0);
        w.insert("b", t0);
        w.insert("c", t0);
        assert_eq!(w.len(), 2);
        assert!(!w.contains("a", t0));
        assert!(w.contains("c", t0));
    }
}
