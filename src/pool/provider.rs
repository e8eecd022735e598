use super::manager::ConnectionPool;
use crate::provider::{Provider, ProviderConfig, StreamSink};
use super::lease::PooledProvider;
use crate::tokens::{estimate_message_tokens, ModelPricing, DEFAULT_COST_PER_TOKEN};
use crate::types::{
    Message, ModelInfo, ProviderResponse, RequestOptions, ResponseMetadata, TokenUsage,
};
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Leases a connection from the pool for every backend call.
///
/// Token and cost estimates never lease. They use the first backend this
/// provider leased, or the static tables before any call has been made.
pub struct PoolBackedProvider {
    pool: Arc<ConnectionPool>,
    key: String,
    config: ProviderConfig,
    estimator: OnceCell<Arc<dyn Provider>>,
}

impl PoolBackedProvider {
    pub fn new(pool: Arc<ConnectionPool>, key: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            pool,
            key: key.into(),
            config,
            estimator: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn lease(&self) -> Result<PooledProvider> {
        let lease = self.pool.get_provider(&self.key, &self.config)?;
        self.estimator.get_or_init(|| Arc::clone(lease.backend()));
        Ok(lease)
    }
}

#[async_trait]
impl Provider for PoolBackedProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn models(&self) -> Result<Vec<ModelInfo>> {
        let lease = self.lease()?;
        lease.models().await
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        let lease = self.lease()?;
        lease.generate(messages, options).await
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        sink: StreamSink<'_>,
    ) -> Result<ResponseMetadata> {
        let lease = self.lease()?;
        lease.generate_stream(messages, options, sink).await
    }

    async fn is_available(&self) -> Result<()> {
        let lease = self.lease()?;
        lease.is_available().await
    }

    fn estimate_tokens(&self, messages: &[Message]) -> Result<usize> {
        match self.estimator.get() {
            Some(backend) => backend.estimate_tokens(messages),
            None => Ok(estimate_message_tokens(messages)),
        }
    }

    fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        if let Some(backend) = self.estimator.get() {
            return backend.calculate_cost(usage);
        }
        match ModelPricing::for_model(&self.config.model) {
            Some(pricing) => pricing.cost_for(usage),
            None => usage.total_tokens as f64 * DEFAULT_COST_PER_TOKEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::testing::MockFactory;

    #[tokio::test]
    async fn test_each_call_leases_and_returns() {
        let factory = Arc::new(MockFactory::new("mock"));
        let pool = ConnectionPool::new(PoolConfig::default(), factory.clone());
        let provider =
            PoolBackedProvider::new(pool.clone(), "mock/m1", ProviderConfig::new("mock", "m1"));
        let msgs = vec![Message::user("hello")];
        let opts = RequestOptions::new("m1");
        for _ in 0..3 {
            provider.generate(&msgs, &opts).await.unwrap();
        }
        assert_eq!(factory.created(), 1);
        let stats = pool.stats();
        assert_eq!((stats.active_count, stats.idle_count, stats.reused), (0, 1, 2));
    }

    #[tokio::test]
    async fn test_cost_falls_back_to_pricing_table() {
        let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(MockFactory::new("mock")));
        let config = ProviderConfig::new("mock", "unknown-model");
        let provider = PoolBackedProvider::new(pool.clone(), "k", config);
        let cost = provider.calculate_cost(&TokenUsage::new(10, 10));
        assert!((cost - 20.0 * DEFAULT_COST_PER_TOKEN).abs() < 1e-12);
        assert_eq!(pool.stats().total_connections, 0);
    }

    #[tokio::test]
    async fn test_estimates_do_not_lease() {
        let factory = Arc::new(MockFactory::new("mock"));
        let config = PoolConfig::default().with_max_requests_per_connection(2);
        let pool = ConnectionPool::new(config, factory.clone());
        let provider =
            PoolBackedProvider::new(pool.clone(), "mock/m1", ProviderConfig::new("mock", "m1"));
        let msgs = vec![Message::user("0123456789ab")];
        assert_eq!(provider.estimate_tokens(&msgs).unwrap(), 3);
        assert_eq!(factory.created(), 0);

        provider.generate(&msgs, &RequestOptions::new("m1")).await.unwrap();
        let usage = TokenUsage::new(100, 50);
        for _ in 0..5 {
            provider.estimate_tokens(&msgs).unwrap();
            assert!((provider.calculate_cost(&usage) - (0.1 * 0.001 + 0.05 * 0.002)).abs() < 1e-12);
        }
        let stats = pool.stats();
        assert_eq!((factory.created(), stats.reused, stats.idle_count), (1, 0, 1));
    }
}
