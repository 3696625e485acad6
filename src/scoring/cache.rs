//! Content-addressed result cache for scoring calls.
//!
//! Keys fingerprint the submission-affecting fields plus submitter
//! identity and trust, so identical content from the same submitter reuses
//! the cached verdict while a different submitter is scored independently.
//! Reads never evict; the background sweeper is the only component that
//! removes entries (expired first, then oldest over capacity).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::{ValidationResult, Venue};
use crate::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(30 * 60),
        }
    }
}

/// SHA-256 over the fields that affect scoring. Venue id deliberately
/// excluded: two records with identical content share a fingerprint.
pub fn fingerprint(venue: &Venue) -> String {
    let mut hasher = Sha256::new();
    for part in [
        venue.name.as_str(),
        venue.location.as_str(),
        venue.phone.as_deref().unwrap_or_default(),
        venue.url.as_deref().unwrap_or_default(),
        venue.description.as_deref().unwrap_or_default(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Full cache key: fingerprint + submitter trust (two decimals) +
/// submitter id.
pub fn cache_key(fingerprint: &str, trust: f64, submitter_id: i64) -> String {
    format!("{fingerprint}:{trust:.2}:{submitter_id}")
}

struct CacheEntry {
    result: ValidationResult,
    inserted_at: Instant,
}

/// Bounded, TTL-expiring score cache.
pub struct ScoreCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    metrics: Option<Metrics>,
}

impl ScoreCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Look up a cached result. Expired entries read as misses but stay in
    /// place for the sweeper.
    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        let entries = self.entries.read().expect("cache lock");
        let found = entries
            .get(key)
            .filter(|e| e.inserted_at.elapsed() < self.config.ttl)
            .map(|e| e.result.clone());
        drop(entries);

        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = &self.metrics {
                    m.cache_hit();
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = &self.metrics {
                    m.cache_miss();
                }
            }
        }
        found
    }

    pub fn put(&self, key: String, result: ValidationResult) {
        let mut entries = self.entries.write().expect("cache lock");
        entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove expired entries, then trim oldest-first down to capacity.
    pub fn sweep(&self) {
        let mut entries = self.entries.write().expect("cache lock");
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.config.ttl);

        if entries.len() > self.config.capacity {
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.inserted_at))
                .collect();
            by_age.sort_by_key(|(_, inserted)| *inserted);
            let excess = entries.len() - self.config.capacity;
            for (key, _) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "score cache swept");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Long-lived sweeper task; the only evictor.
pub fn spawn_sweeper(
    cache: Arc<ScoreCache>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let interval = cache.config.sweep_interval;
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "cache sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => cache.sweep(),
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("cache sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::venue::test_venue;
    use crate::domain::Outcome;
    use std::collections::BTreeMap;

    fn result_for(venue_id: i64) -> ValidationResult {
        ValidationResult {
            venue_id,
            score: 88,
            outcome: Outcome::Approved,
            notes: "cached".to_string(),
            breakdown: BTreeMap::new(),
            raw_model_output: None,
            prompt_version: None,
        }
    }

    #[test]
    fn test_identical_content_shares_fingerprint_across_ids() {
        let a = test_venue(1);
        let mut b = test_venue(2);
        b.created_at = a.created_at;
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_content_change_alters_fingerprint() {
        let a = test_venue(1);
        let mut b = test_venue(1);
        b.description = Some("different text".to_string());
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_cache_key_varies_by_submitter_and_trust() {
        let fp = fingerprint(&test_venue(1));
        assert_ne!(cache_key(&fp, 0.3, 1), cache_key(&fp, 0.3, 2));
        assert_ne!(cache_key(&fp, 0.3, 1), cache_key(&fp, 0.7, 1));
        assert_eq!(cache_key(&fp, 0.3, 1), cache_key(&fp, 0.3, 1));
    }

    #[test]
    fn test_get_put_and_counters() {
        let cache = ScoreCache::new(CacheConfig::default());
        assert!(cache.get("missing").is_none());
        cache.put("k1".to_string(), result_for(1));
        assert_eq!(cache.get("k1").unwrap().venue_id, 1);
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 1);
    }

    #[test]
    fn test_expired_entries_read_as_misses_until_swept() {
        let cache = ScoreCache::new(CacheConfig {
            ttl: Duration::ZERO,
            ..CacheConfig::default()
        });
        cache.put("k1".to_string(), result_for(1));
        assert!(cache.get("k1").is_none());
        // Reads never evict.
        assert_eq!(cache.len(), 1);
        cache.sweep();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_trims_over_capacity() {
        let cache = ScoreCache::new(CacheConfig {
            capacity: 2,
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(1),
        });
        cache.put("k1".to_string(), result_for(1));
        std::thread::sleep(Duration::from_millis(5));
        cache.put("k2".to_string(), result_for(2));
        std::thread::sleep(Duration::from_millis(5));
        cache.put("k3".to_string(), result_for(3));

        cache.sweep();
        assert_eq!(cache.len(), 2);
        // Oldest entry went first.
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k3").is_some());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let cache = Arc::new(ScoreCache::new(CacheConfig::default()));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(cache, rx);
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
