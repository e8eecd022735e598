//! Eviction scoring.
//!
//! Each policy contributes a priority for entries it considers evictable; the
//! cache sums the contributions and removes the highest scores first.

use super::manager::CacheEntry;
use std::cmp::Ordering;
use std::time::{Duration, Instant};

pub trait EvictionPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn should_evict(&self, entry: &CacheEntry, ttl: Duration, now: Instant) -> bool;
    fn priority(&self, entry: &CacheEntry, now: Instant) -> f64;
}

/// Entries older than the TTL, scored by age in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgePolicy;

impl EvictionPolicy for AgePolicy {
    fn name(&self) -> &'static str { "age" }
    fn should_evict(&self, entry: &CacheEntry, ttl: Duration, now: Instant) -> bool {
        entry.age(now) > ttl
    }
    fn priority(&self, entry: &CacheEntry, now: Instant) -> f64 {
        entry.age(now).as_secs_f64()
    }
}

/// Entries idle longer than half the TTL, scored by idle seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyPolicy;

impl EvictionPolicy for RecencyPolicy {
    fn name(&self) -> &'static str { "recency" }
    fn should_evict(&self, entry: &CacheEntry, ttl: Duration, now: Instant) -> bool {
        entry.idle(now) > ttl / 2
    }
    fn priority(&self, entry: &CacheEntry, now: Instant) -> f64 {
        entry.idle(now).as_secs_f64()
    }
}

/// Every entry is a candidate; rarely read entries score higher.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsagePolicy;

impl EvictionPolicy for UsagePolicy {
    fn name(&self) -> &'static str { "usage" }
    fn should_evict(&self, _entry: &CacheEntry, _ttl: Duration, _now: Instant) -> bool {
        true
    }
    fn priority(&self, entry: &CacheEntry, _now: Instant) -> f64 {
        if entry.access_count == 0 {
            1000.0
        } else {
            100.0 / entry.access_count as f64
        }
    }
}

pub fn default_policies() -> Vec<Box<dyn EvictionPolicy>> {
    vec![Box::new(AgePolicy), Box::new(RecencyPolicy), Box::new(UsagePolicy)]
}

pub(crate) fn score(
    policies: &[Box<dyn EvictionPolicy>],
    entry: &CacheEntry,
    ttl: Duration,
    now: Instant,
) -> f64 {
    policies
        .iter()
        .filter(|p| p.should_evict(entry, ttl, now))
        .map(|p| p.priority(entry, now))
        .sum()
}

/// Top `limit` candidates by descending score. Partial selection keeps this
/// linear in the number of candidates.
pub(crate) fn select_victims<K>(mut scored: Vec<(K, f64)>, limit: usize) -> Vec<(K, f64)> {
    let by_score_desc =
        |a: &(K, f64), b: &(K, f64)| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal);
    if limit == 0 {
        return Vec::new();
    }
    if scored.len() > limit {
        scored.select_nth_unstable_by(limit - 1, by_score_desc);
        scored.truncate(limit);
    }
    scored.sort_unstable_by(by_score_desc);
    scored
}
