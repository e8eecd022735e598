//! Response cache manager.

use super::eviction::{self, EvictionPolicy};
use super::key::CacheKeyGenerator;
use crate::tokens::estimate_tokens;
use crate::types::{Message, RequestOptions, ResponseMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upper bound on removals in one eviction pass.
const MAX_EVICTIONS_PER_PASS: usize = 100;
/// Fixed per-entry overhead for bookkeeping and metadata.
const ENTRY_OVERHEAD_BYTES: usize = 200 + 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    #[serde(rename = "ttl_ms", with = "crate::config::duration_ms")]
    pub ttl: Duration,
    pub max_memory_mb: usize,
    pub enable_metrics: bool,
    #[serde(rename = "cleanup_interval_ms", with = "crate::config::duration_ms")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl: Duration::from_secs(30 * 60),
            max_memory_mb: 100,
            enable_metrics: true,
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory_mb = mb;
        self
    }
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Zero limits fall back to the defaults.
    pub fn normalized(mut self) -> Self {
        let d = Self::default();
        if self.max_entries == 0 {
            self.max_entries = d.max_entries;
        }
        if self.ttl.is_zero() {
            self.ttl = d.ttl;
        }
        if self.max_memory_mb == 0 {
            self.max_memory_mb = d.max_memory_mb;
        }
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = d.cleanup_interval;
        }
        self
    }
}

/// A stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub response: String,
    pub metadata: ResponseMetadata,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    pub provider: String,
    pub model: String,
    pub token_count: usize,
    pub cost: f64,
}

impl CacheEntry {
    pub fn new(
        key: String,
        response: String,
        metadata: ResponseMetadata,
        provider: &str,
        model: &str,
    ) -> Self {
        let now = Instant::now();
        let cost = if metadata.cost > 0.0 { metadata.cost } else { 0.0 };
        Self {
            token_count: estimate_tokens(&response),
            key,
            response,
            metadata,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            provider: provider.to_string(),
            model: model.to_string(),
            cost,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_accessed)
    }

    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) > ttl
    }

    /// Estimated footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        self.response.len() + self.key.len() + ENTRY_OVERHEAD_BYTES
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub memory_usage_mb: f64,
    pub hit_rate: f64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    memory_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }

    fn over_limits(&self, config: &CacheConfig) -> bool {
        self.entries.len() >= config.max_entries || self.memory_mb() > config.max_memory_mb as f64
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.memory_bytes += entry.size_bytes();
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            self.memory_bytes = self.memory_bytes.saturating_sub(old.size_bytes());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_bytes());
        Some(entry)
    }
}

/// In-memory response cache keyed by request fingerprint.
///
/// All state sits behind one mutex; no lock is held across an await point.
pub struct ResponseCache {
    config: CacheConfig,
    keygen: CacheKeyGenerator,
    policies: Vec<Box<dyn EvictionPolicy>>,
    state: Mutex<CacheState>,
    shutdown: CancellationToken,
}

impl ResponseCache {
    /// Creates the cache and, when called inside a tokio runtime, starts the
    /// expiry sweep.
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Self::with_policies(config, eviction::default_policies())
    }

    pub fn with_policies(config: CacheConfig, policies: Vec<Box<dyn EvictionPolicy>>) -> Arc<Self> {
        let config = config.normalized();
        info!(
            max_entries = config.max_entries,
            ttl_secs = config.ttl.as_secs(),
            max_memory_mb = config.max_memory_mb,
            policies = ?policies.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "response cache started"
        );
        let cache = Arc::new(Self {
            config,
            keygen: CacheKeyGenerator::new(),
            policies,
            state: Mutex::new(CacheState::default()),
            shutdown: CancellationToken::new(),
        });
        cache.spawn_sweeper();
        cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn key_generator(&self) -> &CacheKeyGenerator {
        &self.keygen
    }

    /// Looks up a stored response. Expired entries are removed and reported
    /// as misses.
    pub fn get(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        provider: &str,
    ) -> Option<CacheEntry> {
        let key = self.keygen.generate(messages, options, provider);
        let now = Instant::now();
        let mut state = self.lock();
        let expired = match state.entries.get(key.as_str()) {
            None => {
                self.record_miss(&mut state);
                debug!(key = key.short(), "cache miss");
                return None;
            }
            Some(entry) => entry.is_expired(self.config.ttl, now),
        };
        if expired {
            state.remove(key.as_str());
            self.record_miss(&mut state);
            debug!(key = key.short(), "cache entry expired");
            return None;
        }
        let entry = state.entries.get_mut(key.as_str())?;
        entry.last_accessed = now;
        entry.access_count += 1;
        let found = entry.clone();
        if self.config.enable_metrics {
            state.hits += 1;
        }
        debug!(key = key.short(), access_count = found.access_count, "cache hit");
        Some(found)
    }

    /// Stores a response, evicting first when the cache is at a limit.
    pub fn set(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        provider: &str,
        response: &str,
        metadata: &ResponseMetadata,
    ) {
        let key = self.keygen.generate(messages, options, provider);
        let entry = CacheEntry::new(
            key.hash.clone(),
            response.to_string(),
            metadata.clone(),
            provider,
            &options.model,
        );
        let mut state = self.lock();
        let replacing = state.entries.contains_key(key.as_str());
        if !replacing && state.over_limits(&self.config) {
            self.evict(&mut state);
        }
        state.insert(entry);
        debug!(key = key.short(), size = state.entries.len(), "cache set");
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.is_expired(self.config.ttl, now))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        if self.config.enable_metrics {
            state.evictions += expired.len() as u64;
        }
        if !expired.is_empty() {
            debug!(
                removed = expired.len(),
                remaining = state.entries.len(),
                "expired cache entries purged"
            );
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            size: state.entries.len(),
            memory_usage_mb: state.memory_mb(),
            hit_rate: if lookups == 0 { 0.0 } else { state.hits as f64 / lookups as f64 },
        }
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        *self.lock() = CacheState::default();
    }

    /// Stops the sweep and clears the cache.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.clear();
        info!("response cache closed");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, state: &mut CacheState) {
        let now = Instant::now();
        let scored: Vec<(String, f64)> = state
            .entries
            .values()
            .map(|e| (e.key.clone(), eviction::score(&self.policies, e, self.config.ttl, now)))
            .collect();
        let mut removed = 0u64;
        for (key, _) in eviction::select_victims(scored, MAX_EVICTIONS_PER_PASS) {
            if !state.over_limits(&self.config) {
                break;
            }
            if state.remove(&key).is_some() {
                removed += 1;
            }
        }
        if self.config.enable_metrics {
            state.evictions += removed;
        }
        debug!(
            removed,
            size = state.entries.len(),
            memory_mb = state.memory_mb(),
            "cache eviction pass"
        );
    }

    fn record_miss(&self, state: &mut CacheState) {
        if self.config.enable_metrics {
            state.misses += 1;
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; cache expiry sweep disabled");
            return;
        };
        let weak = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let period = self.config.cleanup_interval;
        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = weak.upgrade() else { break };
                        cache.purge_expired();
                    }
                }
            }
        });
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
