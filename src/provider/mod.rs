//! Provider 能力模块：所有后端与包装层共享的统一接口。
//!
//! # Provider Capability
//!
//! Every backend, and every wrapper this crate stacks around a backend,
//! implements [`Provider`]. Wrappers forward what they do not optimize, so a
//! composed stack is indistinguishable from a raw backend to callers.

mod config;

pub use config::ProviderConfig;

use crate::types::{
    Message, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};
use crate::Result;
use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// Destination for streamed text chunks.
pub type StreamSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn models(&self) -> Result<Vec<ModelInfo>>;

    async fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse>;

    /// Writes generated text to `sink` as it arrives and returns the final metadata.
    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        sink: StreamSink<'_>,
    ) -> Result<ResponseMetadata>;

    async fn is_available(&self) -> Result<()>;

    fn estimate_tokens(&self, messages: &[Message]) -> Result<usize>;

    fn calculate_cost(&self, usage: &TokenUsage) -> f64;
}
