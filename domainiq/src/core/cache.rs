//! Time-bounded result cache
//!
//! Entries expire lazily: [`AnalysisCache::get`] drops an expired entry when
//! it sees one, and [`AnalysisCache::sweep_older_than`] removes old entries in
//! bulk during the daily reset. There is no other eviction, so the map grows
//! with the number of distinct keys seen between sweeps.

use super::analysis::{AnalysisResult, AnalysisSource};
use super::clock::add_duration;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: AnalysisResult,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < add_duration(self.created_at, self.ttl)
    }
}

/// Keyed store of analysis results with per-entry TTL
///
/// # Example
///
/// ```
/// use domainiq::{AnalysisCache, HeuristicAnalyzer, FallbackAnalyzer};
/// use chrono::Utc;
/// use std::time::Duration;
///
/// let mut cache = AnalysisCache::with_capacity(100);
/// let result = HeuristicAnalyzer::new().heuristic("crab.io").unwrap();
/// let now = Utc::now();
///
/// cache.insert("crab.io", result, Duration::from_secs(3600), now);
/// assert!(cache.get("crab.io", now).is_some());
/// ```
#[derive(Debug)]
pub struct AnalysisCache {
    entries: HashMap<String, CacheEntry>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache sized for `capacity` distinct keys
    pub fn with_capacity(capacity: usize) -> Self {
        AnalysisCache {
            entries: HashMap::with_capacity((capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize),
        }
    }

    /// Return the live value for `key`, dropping it if it has expired
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<AnalysisResult> {
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key`; a zero `ttl` stores nothing
    pub fn insert(&mut self, key: &str, value: AnalysisResult, ttl: Duration, now: DateTime<Utc>) {
        if ttl.is_zero() {
            return;
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                ttl,
            },
        );
    }

    /// Remove every entry created before `cutoff`, returning how many went
    pub fn sweep_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created_at >= cutoff);
        before - self.entries.len()
    }

    /// Remove every entry that came from the fallback
    pub fn purge_fallback(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.value.source != AnalysisSource::Fallback);
        before - self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of stored entries, expired ones included until they are touched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new()
    }
}
