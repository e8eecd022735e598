//! 组合层：把缓存、请求合并与连接池按固定顺序叠加到后端之上。
//!
//! # Composition Pipeline
//!
//! A [`Pipeline`] owns one instance of each engine and hands out composed
//! providers. For `generate` the call path is
//!
//! ```text
//! StackedProvider → CachingProvider → BatchingProvider → PoolBackedProvider → backend
//!   (validate,        (hit: return)     (coalesce by      (lease per call)
//!    timeout)                            model)
//! ```
//!
//! Streaming skips cache and batching and goes through the pool directly.
//! Disabled engines are left out of the stack.
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_accel::config::PipelineConfig;
//! use ai_lib_accel::pipeline::Pipeline;
//! use ai_lib_accel::provider::ProviderConfig;
//! use ai_lib_accel::testing::MockFactory;
//! use ai_lib_accel::types::{Message, RequestOptions};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() -> ai_lib_accel::Result<()> {
//! let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(MockFactory::new("mock")));
//! let provider = pipeline.provider_for(ProviderConfig::new("mock", "m1"));
//!
//! let msgs = vec![Message::user("What is the capital of France?")];
//! let opts = RequestOptions::new("m1").with_temperature(0.0);
//! let first = provider.generate(&msgs, &opts).await?;
//! let second = provider.generate(&msgs, &opts).await?;
//! assert_eq!(first.text, second.text);
//! assert_eq!(pipeline.stats().cache.unwrap().hits, 1);
//! pipeline.close().await;
//! # Ok(())
//! # }
//! ```

mod stack;


pub use stack::StackedProvider;

use crate::batch::{BatchProcessor, BatchStats, BatchingProvider};
use crate::cache::{CacheStats, CachingProvider, ResponseCache};
use crate::config::PipelineConfig;
use crate::pool::{ConnectionPool, PoolBackedProvider, PoolStats};
use crate::provider::{Provider, ProviderConfig};
use crate::registry::ProviderFactory;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    /// `None` when the cache is disabled.
    pub cache: Option<CacheStats>,
    pub pool: PoolStats,
    /// `None` when batching is disabled.
    pub batch: Option<BatchStats>,
}

pub struct Pipeline {
    config: PipelineConfig,
    cache: Option<Arc<ResponseCache>>,
    batch: Option<Arc<BatchProcessor>>,
    pool: Arc<ConnectionPool>,
}

impl Pipeline {
    /// Builds the engines. Call inside a tokio runtime so their background
    /// tasks can start.
    pub fn new(config: PipelineConfig, factory: Arc<dyn ProviderFactory>) -> Self {
        let config = config.normalized();
        let cache = config.cache.enabled.then(|| ResponseCache::new(config.cache.clone()));
        let batch = config.batch.enabled.then(|| BatchProcessor::new(config.batch.clone()));
        let pool = ConnectionPool::new(config.pool.clone(), factory);
        info!(cache = cache.is_some(), batch = batch.is_some(), "pipeline ready");
        Self { config, cache, batch, pool }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub fn batch(&self) -> Option<&Arc<BatchProcessor>> {
        self.batch.as_ref()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Composed provider whose connections are pooled under `key`.
    pub fn provider(&self, key: impl Into<String>, config: ProviderConfig) -> Arc<dyn Provider> {
        let direct: Arc<dyn Provider> =
            Arc::new(PoolBackedProvider::new(Arc::clone(&self.pool), key, config));
        let mut accelerated = Arc::clone(&direct);
        if let Some(batch) = &self.batch {
            accelerated = Arc::new(BatchingProvider::new(accelerated, Arc::clone(batch)));
        }
        if let Some(cache) = &self.cache {
            accelerated = Arc::new(CachingProvider::new(accelerated, Arc::clone(cache)));
        }
        Arc::new(StackedProvider::new(accelerated, direct))
    }

    /// Same as [`provider`](Self::provider) keyed by [`ProviderConfig::pool_key`].
    pub fn provider_for(&self, config: ProviderConfig) -> Arc<dyn Provider> {
        let key = config.pool_key();
        self.provider(key, config)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            cache: self.cache.as_ref().map(|c| c.stats()),
            pool: self.pool.stats(),
            batch: self.batch.as_ref().map(|b| b.stats()),
        }
    }

    /// Flushes batching and waits for flushed batches to finish, then closes
    /// the pool and the cache.
    pub async fn close(&self) {
        if let Some(batch) = &self.batch {
            batch.shutdown().await;
        }
        self.pool.close();
        if let Some(cache) = &self.cache {
            cache.close();
        }
        info!("pipeline closed");
    }
}
