//! Response cache behavior through the public API.

use ai_lib_accel::cache::{CacheConfig, CachingProvider, ResponseCache};
use ai_lib_accel::provider::Provider;
use ai_lib_accel::testing::MockProvider;
use ai_lib_accel::types::{Message, RequestOptions, ResponseMetadata};
use std::sync::Arc;
use std::time::Duration;

fn metadata() -> ResponseMetadata {
    ResponseMetadata {
        model: "m1".into(),
        provider: "openai".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_identical_request_hits() {
    let cache = ResponseCache::new(CacheConfig::default().with_ttl(Duration::from_secs(30 * 60)));
    let msgs = vec![Message::user("What is the capital of France?")];
    let opts = RequestOptions::new("m1").with_temperature(0.0);

    cache.set(&msgs, &opts, "openai", "Paris", &metadata());
    let hit = cache.get(&msgs, &opts, "openai").expect("cached");
    assert_eq!(hit.response, "Paris");

    let other = RequestOptions::new("m1").with_temperature(0.5);
    assert!(cache.get(&msgs, &other, "openai").is_none());
    assert!(cache.get(&msgs, &opts, "anthropic").is_none());

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.size), (1, 2, 1));
}

#[tokio::test]
async fn test_entry_count_never_exceeds_limit() {
    let cache = ResponseCache::new(CacheConfig::default().with_max_entries(5));
    let opts = RequestOptions::new("m1");
    for i in 0..40 {
        let msgs = [Message::user(format!("prompt {}", i))];
        cache.set(&msgs, &opts, "openai", "answer", &metadata());
        assert!(cache.len() <= 5, "size {} after insert {}", cache.len(), i);
    }
    assert!(cache.stats().evictions >= 35);
}

#[tokio::test]
async fn test_expired_entries_are_misses() {
    let cache = ResponseCache::new(CacheConfig::default().with_ttl(Duration::from_millis(40)));
    let msgs = vec![Message::user("short lived")];
    let opts = RequestOptions::new("m1");
    cache.set(&msgs, &opts, "openai", "soon gone", &metadata());
    assert!(cache.get(&msgs, &opts, "openai").is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(cache.get(&msgs, &opts, "openai").is_none());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_caching_provider_skips_backend_on_repeat() {
    let backend = Arc::new(MockProvider::new("mock"));
    let cache = ResponseCache::new(CacheConfig::default());
    let provider = CachingProvider::new(backend.clone(), Arc::clone(&cache));
    let msgs = vec![Message::user("repeat me")];
    let opts = RequestOptions::new("m1");

    let first = provider.generate(&msgs, &opts).await.unwrap();
    let second = provider.generate(&msgs, &opts).await.unwrap();
    assert_eq!(first.text, second.text);
    assert_eq!(backend.calls(), 1);

    cache.clear();
    provider.generate(&msgs, &opts).await.unwrap();
    assert_eq!(backend.calls(), 2);
}
