//! In-process provider doubles for tests and benches.

use crate::provider::{Provider, ProviderConfig, StreamSink};
use crate::registry::ProviderFactory;
use crate::tokens::{estimate_message_tokens, ModelPricing};
use crate::types::{
    Message, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Scripted backend: echoes the last message, optionally after a delay,
/// failing any request whose content contains `fail_marker`.
pub struct MockProvider {
    name: String,
    latency: Duration,
    fail_marker: Option<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            fail_marker: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
    pub fn with_fail_marker(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(messages: &[Message]) -> String {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        format!("echo: {}", last)
    }

    async fn call(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker {
            if messages.iter().any(|m| m.content.contains(marker.as_str())) {
                return Err(Error::provider(&self.name, "scripted failure"));
            }
        }
        let text = Self::reply_for(messages);
        let usage = TokenUsage::new(
            estimate_message_tokens(messages) as u32,
            (text.len() / 4) as u32,
        );
        let metadata = ResponseMetadata {
            model: options.model.clone(),
            provider: self.name.clone(),
            usage,
            cost: self.calculate_cost(&usage),
            duration_ms: Some(self.latency.as_millis() as u64),
            finish_reason: Some("stop".into()),
        };
        Ok(ProviderResponse::new(text, metadata))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            name: "mock-model".into(),
            provider: self.name.clone(),
            max_tokens: 4096,
            supports_tools: false,
            supports_images: false,
        }])
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        self.call(messages, options).await
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        sink: StreamSink<'_>,
    ) -> Result<ResponseMetadata> {
        let resp = self.call(messages, options).await?;
        for chunk in resp.text.split_inclusive(' ') {
            sink.write_all(chunk.as_bytes()).await?;
        }
        sink.flush().await?;
        Ok(resp.metadata)
    }

    async fn is_available(&self) -> Result<()> {
        Ok(())
    }

    fn estimate_tokens(&self, messages: &[Message]) -> Result<usize> {
        Ok(estimate_message_tokens(messages))
    }

    fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        ModelPricing::new("mock-model", 0.001, 0.002).cost_for(usage)
    }
}

/// Factory producing [`MockProvider`]s and counting constructions.
pub struct MockFactory {
    name: String,
    latency: Duration,
    created: AtomicUsize,
    fail_create: bool,
}

impl MockFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            created: AtomicUsize::new(0),
            fail_create: false,
        }
    }
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
    pub fn failing(mut self) -> Self {
        self.fail_create = true;
        self
    }
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for MockFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        if self.fail_create {
            return Err(Error::provider(&config.name, "construction refused"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockProvider::new(&self.name).with_latency(self.latency)))
    }
}
