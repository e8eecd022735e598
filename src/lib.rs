//! # ai-lib-accel
//!
//! 面向 AI 模型调用的加速与弹性层：响应缓存、连接池与请求合并，组合于任意后端之上。
//!
//! Acceleration and resilience layer for AI model calls. Three engines sit
//! between a caller and any backend that implements [`provider::Provider`]:
//!
//! - **Response cache**: fingerprints `(backend, model, temperature,
//!   max_tokens, messages)` and serves repeats from memory, bounded by entry
//!   count, memory and TTL.
//! - **Connection pool**: reuses backend instances per key, bounded by active
//!   and idle limits, lifetime and per-connection usage.
//! - **Batch coalescer**: groups concurrent requests for the same model and
//!   dispatches them together, flushing on size, age, cost or token limits.
//!
//! Each engine exposes an `*Provider` decorator, and [`pipeline::Pipeline`]
//! stacks them in a fixed order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_accel::{Message, Pipeline, PipelineConfig, ProviderConfig, RequestOptions};
//! use ai_lib_accel::registry::ProviderRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_accel::Result<()> {
//!     let registry = Arc::new(ProviderRegistry::new());
//!     // registry.register(Arc::new(MyBackendFactory::new()));
//!
//!     let pipeline = Pipeline::new(PipelineConfig::from_env(), registry);
//!     let provider = pipeline.provider_for(ProviderConfig::new("openai", "gpt-4o-mini"));
//!     let reply = provider
//!         .generate(&[Message::user("Hello!")], &RequestOptions::new("gpt-4o-mini"))
//!         .await?;
//!     println!("{}", reply.text);
//!     pipeline.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`provider`] | Backend capability trait and configuration |
//! | [`registry`] | Provider factories and the registry that builds backends |
//! | [`types`] | Messages, request options, responses |
//! | [`tokens`] | Token estimation and per-model pricing |
//! | [`cache`] | Response cache, fingerprinting and eviction policies |
//! | [`pool`] | Connection pool and leased providers |
//! | [`batch`] | Batch collection, flushing and execution |
//! | [`pipeline`] | Fixed-order composition of the engines |
//! | [`config`] | Engine configuration from code, files and environment |
//! | [`telemetry`] | `tracing` subscriber setup and stats logging |
//! | [`facade`] | Process-wide conveniences for applications |

pub mod batch;
pub mod cache;
pub mod config;
pub mod facade;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod registry;
pub mod telemetry;
pub mod tokens;
pub mod types;

#[doc(hidden)]
pub mod testing;

pub use batch::{BatchConfig, BatchProcessor, BatchStats, BatchingProvider};
pub use cache::{CacheConfig, CacheStats, CachingProvider, ResponseCache};
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineStats};
pub use pool::{ConnectionPool, PoolBackedProvider, PoolConfig, PoolStats, PooledProvider};
pub use provider::{Provider, ProviderConfig, StreamSink};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use types::{
    Message, MessageRole, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
