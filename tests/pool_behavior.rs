//! Connection pool limits, reuse and retirement.

use ai_lib_accel::pool::{ConnectionPool, PoolBackedProvider, PoolConfig};
use ai_lib_accel::provider::{Provider, ProviderConfig};
use ai_lib_accel::testing::MockFactory;
use ai_lib_accel::types::{Message, RequestOptions};
use ai_lib_accel::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn cfg() -> ProviderConfig {
    ProviderConfig::new("mock", "m1")
}

#[tokio::test]
async fn test_third_lease_is_refused_at_max_active() {
    let factory = Arc::new(MockFactory::new("mock"));
    let pool = ConnectionPool::new(PoolConfig::default().with_max_active(2), factory);

    let first = assert_ok!(pool.get_provider("k", &cfg()));
    let second = assert_ok!(pool.get_provider("k", &cfg()));
    match pool.get_provider("k", &cfg()) {
        Err(Error::PoolExhausted { active_count, max_active, .. }) => {
            assert_eq!((active_count, max_active), (2, 2));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }

    drop(first);
    let third = assert_ok!(pool.get_provider("k", &cfg()));
    assert_eq!(pool.stats().reused, 1);
    drop((second, third));
    assert_eq!(pool.stats().active_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leases_respect_cap() {
    let factory = Arc::new(MockFactory::new("mock"));
    let pool = ConnectionPool::new(PoolConfig::default().with_max_active(3), factory);
    let tasks = (0..20).map(|_| {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            match pool.get_provider("k", &cfg()) {
                Ok(lease) => {
                    assert!(pool.stats().active_count <= 3);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    drop(lease);
                    true
                }
                Err(e) => {
                    assert!(e.is_pool_exhausted());
                    false
                }
            }
        })
    });
    let granted = futures::future::join_all(tasks)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();
    assert!(granted >= 3);
    assert_eq!(pool.stats().active_count, 0);
    assert!(pool.stats().total_connections <= 3);
}

#[tokio::test]
async fn test_connection_retired_after_max_usage() {
    let factory = Arc::new(MockFactory::new("mock"));
    let config = PoolConfig::default().with_max_requests_per_connection(2);
    let pool = ConnectionPool::new(config, factory.clone());

    for _ in 0..3 {
        pool.get_provider("k", &cfg()).unwrap().release();
    }
    let stats = pool.stats();
    assert_eq!(factory.created(), 2);
    assert_eq!((stats.created, stats.reused, stats.discarded), (2, 1, 1));
}

#[tokio::test]
async fn test_idle_connections_swept_after_timeout() {
    let pool = ConnectionPool::new(
        PoolConfig::default().with_idle_timeout(Duration::from_millis(20)),
        Arc::new(MockFactory::new("mock")),
    );
    pool.get_provider("a", &cfg()).unwrap().release();
    pool.get_provider("b", &cfg()).unwrap().release();
    assert_eq!(pool.stats().idle_count, 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.sweep(), 2);
    assert_eq!(pool.stats().total_connections, 0);

    pool.close();
    assert_err!(pool.get_provider("a", &cfg()));
}

#[tokio::test]
async fn test_pool_backed_provider_returns_lease_after_each_call() {
    let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(MockFactory::new("mock")));
    let provider = PoolBackedProvider::new(Arc::clone(&pool), "mock/m1", cfg());
    let opts = RequestOptions::new("m1");

    for i in 0..5 {
        let reply = provider.generate(&[Message::user(format!("n{}", i))], &opts).await.unwrap();
        assert_eq!(reply.text, format!("echo: n{}", i));
    }
    let stats = pool.stats();
    assert_eq!((stats.created, stats.reused, stats.active_count), (1, 4, 0));
}
