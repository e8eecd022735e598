//! 响应缓存模块：以请求指纹为键的内存缓存，带 TTL、容量与内存上限。
//!
//! # Response Cache
//!
//! Bounded in-memory cache of generated responses, keyed by a SHA-256
//! fingerprint of the request. Stale entries are misses; when a limit is hit
//! the cache evicts by a combined age, recency and usage score.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | The cache: lookups, inserts, eviction, expiry sweep, stats |
//! | [`CacheConfig`] | Capacity, TTL, memory limit and sweep interval |
//! | [`CacheKeyGenerator`] | Request fingerprinting |
//! | [`EvictionPolicy`] | Scoring contribution; [`AgePolicy`], [`RecencyPolicy`], [`UsagePolicy`] |
//! | [`CachingProvider`] | `Provider` wrapper that serves hits without calling the backend |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_accel::cache::{CacheConfig, ResponseCache};
//! use ai_lib_accel::types::{Message, RequestOptions, ResponseMetadata};
//! use std::time::Duration;
//!
//! let cache = ResponseCache::new(CacheConfig::new().with_ttl(Duration::from_secs(60)));
//! let msgs = vec![Message::user("What is the capital of France?")];
//! let opts = RequestOptions::new("m1").with_temperature(0.0);
//!
//! assert!(cache.get(&msgs, &opts, "openai").is_none());
//! cache.set(&msgs, &opts, "openai", "Paris", &ResponseMetadata::default());
//! assert_eq!(cache.get(&msgs, &opts, "openai").unwrap().response, "Paris");
//! ```

mod eviction;
mod key;
mod manager;
mod provider;

pub use eviction::{default_policies, AgePolicy, EvictionPolicy, RecencyPolicy, UsagePolicy};
pub use key::{CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheEntry, CacheStats, ResponseCache};
pub use provider::CachingProvider;
