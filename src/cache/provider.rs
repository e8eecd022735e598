use super::manager::ResponseCache;
use crate::provider::{Provider, StreamSink};
use crate::types::{
    Message, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Serves repeated `generate` calls from a [`ResponseCache`].
///
/// Errors from the inner provider are returned as-is and never stored.
pub struct CachingProvider {
    inner: Arc<dyn Provider>,
    cache: Arc<ResponseCache>,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn Provider>, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }
}

#[async_trait]
impl Provider for CachingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn models(&self) -> Result<Vec<ModelInfo>> {
        self.inner.models().await
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        if let Some(entry) = self.cache.get(messages, options, self.inner.name()) {
            return Ok(ProviderResponse::new(entry.response, entry.metadata));
        }
        let response = self.inner.generate(messages, options).await?;
        self.cache
            .set(messages, options, self.inner.name(), &response.text, &response.metadata);
        Ok(response)
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        sink: StreamSink<'_>,
    ) -> Result<ResponseMetadata> {
        self.inner.generate_stream(messages, options, sink).await
    }

    async fn is_available(&self) -> Result<()> {
        self.inner.is_available().await
    }

    fn estimate_tokens(&self, messages: &[Message]) -> Result<usize> {
        self.inner.estimate_tokens(messages)
    }

    fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        self.inner.calculate_cost(usage)
    }
}
