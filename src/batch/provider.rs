use super::processor::BatchProcessor;
use crate::provider::{Provider, StreamSink};
use crate::types::{
    Message, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Routes `generate` through a [`BatchProcessor`]; everything else, streaming
/// included, goes straight to the inner provider.
pub struct BatchingProvider {
    inner: Arc<dyn Provider>,
    processor: Arc<BatchProcessor>,
}

impl BatchingProvider {
    pub fn new(inner: Arc<dyn Provider>, processor: Arc<BatchProcessor>) -> Self {
        Self { inner, processor }
    }

    pub fn processor(&self) -> &Arc<BatchProcessor> {
        &self.processor
    }
}

#[async_trait]
impl Provider for BatchingProvider {
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
        self.processor
            .submit_request(Arc::clone(&self.inner), messages, options)
            .await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchConfig;
    use crate::testing::MockProvider;
    use futures::future::join_all;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_a_batch() {
        let backend = Arc::new(MockProvider::new("mock"));
        let processor = BatchProcessor::new(BatchConfig::default().with_max_batch_size(4));
        let provider = BatchingProvider::new(backend.clone(), processor.clone());
        let opts = RequestOptions::new("m1");
        let prompts: Vec<Vec<Message>> =
            (0..4).map(|i| vec![Message::user(format!("q{i}"))]).collect();

        let results = join_all(prompts.iter().map(|m| provider.generate(m, &opts))).await;
        for (i, r) in results.into_iter().enumerate() {
            assert_eq!(r.unwrap().text, format!("echo: q{i}"));
        }
        assert_eq!(backend.calls(), 4);
        assert_eq!(processor.stats().total_requests, 4);
    }

    #[tokio::test]
    async fn test_stream_bypasses_batching() {
        let backend = Arc::new(MockProvider::new("mock"));
        let processor = BatchProcessor::new(BatchConfig::default());
        let provider = BatchingProvider::new(backend.clone(), processor.clone());
        let mut out: Vec<u8> = Vec::new();
        provider
            .generate_stream(&[Message::user("stream me")], &RequestOptions::new("m1"), &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "echo: stream me");
        assert_eq!(processor.stats().total_requests, 0);
    }
}
