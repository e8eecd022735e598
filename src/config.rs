//! 配置模块：三个引擎的组合配置，支持 YAML/JSON 文件与环境变量覆盖。
//!
//! # Pipeline Configuration
//!
//! [`PipelineConfig`] bundles the cache, pool and batch settings. It loads
//! from YAML or JSON (durations are written in milliseconds under `*_ms`
//! keys) and can be overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AI_LIB_CACHE_ENABLED` | `cache.enabled` |
//! | `AI_LIB_CACHE_MAX_ENTRIES` | `cache.max_entries` |
//! | `AI_LIB_CACHE_TTL_MS` | `cache.ttl` |
//! | `AI_LIB_CACHE_MAX_MEMORY_MB` | `cache.max_memory_mb` |
//! | `AI_LIB_CACHE_METRICS` | `cache.enable_metrics` |
//! | `AI_LIB_CACHE_CLEANUP_INTERVAL_MS` | `cache.cleanup_interval` |
//! | `AI_LIB_POOL_MAX_IDLE` | `pool.max_idle` |
//! | `AI_LIB_POOL_MAX_ACTIVE` | `pool.max_active` |
//! | `AI_LIB_POOL_IDLE_TIMEOUT_MS` | `pool.idle_timeout` |
//! | `AI_LIB_POOL_MAX_LIFETIME_MS` | `pool.max_lifetime` |
//! | `AI_LIB_POOL_MAX_REQUESTS` | `pool.max_requests_per_connection` |
//! | `AI_LIB_POOL_CLEANUP_INTERVAL_MS` | `pool.cleanup_interval` |
//! | `AI_LIB_BATCH_ENABLED` | `batch.enabled` |
//! | `AI_LIB_BATCH_MAX_SIZE` | `batch.max_batch_size` |
//! | `AI_LIB_BATCH_TIMEOUT_MS` | `batch.batch_timeout` |
//! | `AI_LIB_BATCH_FLUSH_INTERVAL_MS` | `batch.flush_interval` |
//! | `AI_LIB_BATCH_CONCURRENCY` | `batch.max_concurrency` |
//! | `AI_LIB_BATCH_COST_THRESHOLD` | `batch.cost_threshold` |
//! | `AI_LIB_BATCH_TOKEN_THRESHOLD` | `batch.token_threshold` |
//! | `AI_LIB_BATCH_PRIORITY` | `batch.priority_batching` |
//! | `AI_LIB_BATCH_RESPONSE_TIMEOUT_FACTOR` | `batch.response_timeout_factor` |
//!
//! Unparseable values are ignored with a warning.
//!
//! ```rust
//! use ai_lib_accel::config::PipelineConfig;
//! use std::time::Duration;
//!
//! let yaml = "cache:\n  ttl_ms: 60000\nbatch:\n  enabled: false\n";
//! let cfg = PipelineConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(cfg.cache.ttl, Duration::from_secs(60));
//! assert!(!cfg.batch.enabled);
//! assert_eq!(cfg.pool.max_active, 50);
//! ```

use crate::batch::BatchConfig;
use crate::cache::CacheConfig;
use crate::pool::PoolConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub batch: BatchConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Loads a `.json` file as JSON and anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new().with_details(path.display().to_string()),
            )
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&raw),
            _ => Self::from_yaml_str(&raw),
        }
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    pub fn apply_env(self) -> Self {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable source.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);

        let c = &mut self.cache;
        env.set_flag("AI_LIB_CACHE_ENABLED", &mut c.enabled);
        env.set("AI_LIB_CACHE_MAX_ENTRIES", &mut c.max_entries);
        env.set_millis("AI_LIB_CACHE_TTL_MS", &mut c.ttl);
        env.set("AI_LIB_CACHE_MAX_MEMORY_MB", &mut c.max_memory_mb);
        env.set_flag("AI_LIB_CACHE_METRICS", &mut c.enable_metrics);
        env.set_millis("AI_LIB_CACHE_CLEANUP_INTERVAL_MS", &mut c.cleanup_interval);

        let p = &mut self.pool;
        env.set("AI_LIB_POOL_MAX_IDLE", &mut p.max_idle);
        env.set("AI_LIB_POOL_MAX_ACTIVE", &mut p.max_active);
        env.set_millis("AI_LIB_POOL_IDLE_TIMEOUT_MS", &mut p.idle_timeout);
        env.set_millis("AI_LIB_POOL_MAX_LIFETIME_MS", &mut p.max_lifetime);
        env.set("AI_LIB_POOL_MAX_REQUESTS", &mut p.max_requests_per_connection);
        env.set_millis("AI_LIB_POOL_CLEANUP_INTERVAL_MS", &mut p.cleanup_interval);

        let b = &mut self.batch;
        env.set_flag("AI_LIB_BATCH_ENABLED", &mut b.enabled);
        env.set("AI_LIB_BATCH_MAX_SIZE", &mut b.max_batch_size);
        env.set_millis("AI_LIB_BATCH_TIMEOUT_MS", &mut b.batch_timeout);
        env.set_millis("AI_LIB_BATCH_FLUSH_INTERVAL_MS", &mut b.flush_interval);
        env.set("AI_LIB_BATCH_CONCURRENCY", &mut b.max_concurrency);
        env.set("AI_LIB_BATCH_COST_THRESHOLD", &mut b.cost_threshold);
        env.set("AI_LIB_BATCH_TOKEN_THRESHOLD", &mut b.token_threshold);
        env.set_flag("AI_LIB_BATCH_PRIORITY", &mut b.priority_batching);
        env.set("AI_LIB_BATCH_RESPONSE_TIMEOUT_FACTOR", &mut b.response_timeout_factor);

        self
    }

    /// Each section with zero limits replaced by defaults.
    pub fn normalized(self) -> Self {
        Self {
            cache: self.cache.normalized(),
            pool: self.pool.normalized(),
            batch: self.batch.normalized(),
        }
    }
}

struct EnvSource<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn get<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = (self.0)(name)?;
        match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(var = name, value = %raw, "ignoring unparseable environment override");
                None
            }
        }
    }

    fn set<T: FromStr>(&self, name: &str, slot: &mut T) {
        if let Some(v) = self.get(name) {
            *slot = v;
        }
    }

    fn set_millis(&self, name: &str, slot: &mut Duration) {
        if let Some(ms) = self.get::<u64>(name) {
            *slot = Duration::from_millis(ms);
        }
    }

    fn set_flag(&self, name: &str, slot: &mut bool) {
        let Some(raw) = (self.0)(name) else { return };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *slot = true,
            "0" | "false" | "no" | "off" => *slot = false,
            _ => warn!(var = name, value = %raw, "ignoring unparseable environment flag"),
        }
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
