use crate::provider::{Provider, StreamSink};
use crate::types::{
    Message, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Outermost layer of a composed provider.
///
/// Validates options once, enforces `options.timeout`, sends `generate`
/// through the accelerated stack and everything else, streaming included,
/// through the pool straight to the backend.
pub struct StackedProvider {
    accelerated: Arc<dyn Provider>,
    direct: Arc<dyn Provider>,
}

impl StackedProvider {
    pub fn new(accelerated: Arc<dyn Provider>, direct: Arc<dyn Provider>) -> Self {
        Self { accelerated, direct }
    }
}

async fn bounded<T, F>(options: &RequestOptions, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| Error::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        })?,
        None => call.await,
    }
}

#[async_trait]
impl Provider for StackedProvider {
    fn name(&self) -> &str {
        self.direct.name()
    }

    async fn models(&self) -> Result<Vec<ModelInfo>> {
        self.direct.models().await
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        options.validate()?;
        bounded(options, "generate", self.accelerated.generate(messages, options)).await
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        sink: StreamSink<'_>,
    ) -> Result<ResponseMetadata> {
        options.validate()?;
        let call = self.direct.generate_stream(messages, options, sink);
        bounded(options, "generate_stream", call).await
    }

    async fn is_available(&self) -> Result<()> {
        self.direct.is_available().await
    }

    fn estimate_tokens(&self, messages: &[Message]) -> Result<usize> {
        self.direct.estimate_tokens(messages)
    }

    fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        self.direct.calculate_cost(usage)
    }
}
