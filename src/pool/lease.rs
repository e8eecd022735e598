use super::manager::ConnectionPool;
use crate::provider::{Provider, StreamSink};
use crate::types::{
    Message, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A leased connection. `generate` and `generate_stream` hand the connection
/// back once the call finishes; dropping the lease hands it back too.
pub struct PooledProvider {
    pool: Arc<ConnectionPool>,
    key: String,
    id: u64,
    provider: Arc<dyn Provider>,
    returned: AtomicBool,
}

impl PooledProvider {
    pub(crate) fn new(
        pool: Arc<ConnectionPool>,
        key: &str,
        id: u64,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            pool,
            key: key.to_string(),
            id,
            provider,
            returned: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn connection_id(&self) -> u64 {
        self.id
    }

    pub fn is_returned(&self) -> bool {
        self.returned.load(Ordering::SeqCst)
    }

    /// Returns the connection to the pool. Later calls are no-ops.
    pub fn release(&self) {
        if !self.returned.swap(true, Ordering::SeqCst) {
            self.pool.release(&self.key, self.id);
        }
    }

    /// The leased backend, for calls that do not need the lease itself.
    pub(crate) fn backend(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    fn checkout(&self) -> Result<&Arc<dyn Provider>> {
        if self.is_returned() {
            return Err(Error::validation_with_context(
                "lease already returned to the pool",
                ErrorContext::new()
                    .with_source("connection_pool")
                    .with_details(format!("key={}, connection={}", self.key, self.id)),
            ));
        }
        Ok(&self.provider)
    }
}

impl std::fmt::Debug for PooledProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledProvider")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("returned", &self.is_returned())
            .finish()
    }
}

impl Drop for PooledProvider {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl Provider for PooledProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn models(&self) -> Result<Vec<ModelInfo>> {
        self.checkout()?.models().await
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        let result = self.checkout()?.generate(messages, options).await;
        self.release();
        result
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        sink: StreamSink<'_>,
    ) -> Result<ResponseMetadata> {
        let result = self.checkout()?.generate_stream(messages, options, sink).await;
        self.release();
        result
    }

    async fn is_available(&self) -> Result<()> {
        self.checkout()?.is_available().await
    }

    fn estimate_tokens(&self, messages: &[Message]) -> Result<usize> {
        self.checkout()?.estimate_tokens(messages)
    }

    fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        self.provider.calculate_cost(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::provider::ProviderConfig;
    use crate::testing::MockFactory;

    #[tokio::test]
    async fn test_generate_returns_lease_once() {
        let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(MockFactory::new("mock")));
        let lease = pool.get_provider("k", &ProviderConfig::new("mock", "m1")).unwrap();
        let msgs = vec![Message::user("hi")];
        let opts = RequestOptions::new("m1");

        let resp = lease.generate(&msgs, &opts).await.unwrap();
        assert_eq!(resp.text, "echo: hi");
        assert!(lease.is_returned());
        assert_eq!(pool.stats().idle_count, 1);

        let reuse = lease.generate(&msgs, &opts).await;
        assert!(matches!(reuse, Err(Error::Validation { .. })));
        drop(lease);
        assert_eq!(pool.stats().idle_count, 1);
    }

    #[tokio::test]
    async fn test_passthrough_keeps_lease() {
        let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(MockFactory::new("mock")));
        let lease = pool.get_provider("k", &ProviderConfig::new("mock", "m1")).unwrap();
        assert_eq!(lease.models().await.unwrap().len(), 1);
        assert!(lease.is_available().await.is_ok());
        assert!(!lease.is_returned());
        assert_eq!(pool.stats().active_count, 1);
    }
}
