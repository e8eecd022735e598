//! Batch coalescer: size cap, liveness and per-request delivery.

use ai_lib_accel::batch::{BatchConfig, BatchProcessor, BatchingProvider};
use ai_lib_accel::provider::Provider;
use ai_lib_accel::testing::MockProvider;
use ai_lib_accel::types::{Message, RequestOptions};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn batching(
    config: BatchConfig,
    backend: Arc<MockProvider>,
) -> (Arc<BatchProcessor>, Arc<BatchingProvider>) {
    let processor = BatchProcessor::new(config);
    let provider = Arc::new(BatchingProvider::new(backend, Arc::clone(&processor)));
    (processor, provider)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_is_split_by_max_batch_size() {
    let backend = Arc::new(MockProvider::new("mock").with_latency(Duration::from_millis(10)));
    let config = BatchConfig::default()
        .with_max_batch_size(10)
        .with_batch_timeout(Duration::from_millis(100));
    let (processor, provider) = batching(config, backend.clone());
    let opts = RequestOptions::new("m1");

    let calls = (0..25).map(|i| {
        let provider = Arc::clone(&provider);
        let opts = opts.clone();
        tokio::spawn(async move {
            let msgs = [Message::user(format!("req-{}", i))];
            provider.generate(&msgs, &opts).await
        })
    });
    let replies = futures::future::join_all(calls).await;
    for (i, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.unwrap().unwrap().text, format!("echo: req-{}", i));
    }

    processor.drain().await;
    let stats = processor.stats();
    assert_eq!(stats.total_requests, 25);
    assert_eq!(stats.batched_requests, 25);
    assert_eq!(stats.fallback_requests, 0);
    assert!(stats.largest_batch <= 10, "largest batch {}", stats.largest_batch);
    assert!(stats.total_batches >= 3);
    assert_eq!(backend.calls(), 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lone_request_is_not_stranded() {
    let backend = Arc::new(MockProvider::new("mock"));
    let config = BatchConfig::default().with_batch_timeout(Duration::from_millis(100));
    let (processor, provider) = batching(config, backend);

    let started = Instant::now();
    let reply = provider
        .generate(&[Message::user("alone")], &RequestOptions::new("m2"))
        .await
        .unwrap();
    let waited = started.elapsed();
    assert_eq!(reply.text, "echo: alone");
    assert!(waited < Duration::from_millis(500), "waited {:?}", waited);

    processor.drain().await;
    assert_eq!(processor.stats().total_batches, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_stays_with_its_request() {
    let backend = Arc::new(MockProvider::new("mock").with_fail_marker("boom"));
    let config = BatchConfig::default().with_max_batch_size(4);
    let (processor, provider) = batching(config, backend);
    let opts = RequestOptions::new("m1");

    let prompts = ["ok-1", "boom", "ok-2", "ok-3"];
    let calls = prompts.iter().map(|p| {
        let provider = Arc::clone(&provider);
        let opts = opts.clone();
        let msgs = vec![Message::user(*p)];
        tokio::spawn(async move { provider.generate(&msgs, &opts).await })
    });
    let replies: Vec<_> = futures::future::join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    for (prompt, reply) in prompts.iter().zip(&replies) {
        if *prompt == "boom" {
            assert!(reply.is_err());
        } else {
            assert_eq!(reply.as_ref().unwrap().text, format!("echo: {}", prompt));
        }
    }
    processor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_models_are_never_mixed() {
    let backend = Arc::new(MockProvider::new("mock"));
    let (processor, provider) = batching(BatchConfig::default(), backend);

    let calls = (0..12).map(|i| {
        let provider = Arc::clone(&provider);
        let model = if i % 2 == 0 { "even" } else { "odd" };
        tokio::spawn(async move {
            let reply = provider
                .generate(&[Message::user(format!("{}", i))], &RequestOptions::new(model))
                .await
                .unwrap();
            assert_eq!(reply.metadata.model, model);
        })
    });
    for call in futures::future::join_all(calls).await {
        call.unwrap();
    }
    processor.drain().await;
    assert!(processor.stats().total_batches >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_sends_late_requests_direct() {
    let backend = Arc::new(MockProvider::new("mock"));
    let (processor, provider) = batching(BatchConfig::default(), backend.clone());
    processor.shutdown().await;

    let reply = provider
        .generate(&[Message::user("late")], &RequestOptions::new("m1"))
        .await
        .unwrap();
    assert_eq!(reply.text, "echo: late");
    assert_eq!(processor.stats().fallback_requests, 1);
    assert_eq!(backend.calls(), 1);
}

async fn submit_per_model(provider: &Arc<BatchingProvider>, models: &[&str]) -> Vec<String> {
    let calls = models.iter().map(|model| {
        let provider = Arc::clone(provider);
        let msgs = vec![Message::user(format!("for {}", model))];
        let opts = RequestOptions::new(*model);
        tokio::spawn(async move { provider.generate(&msgs, &opts).await })
    });
    futures::future::join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap().text)
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_batches_fall_back_after_response_timeout() {
    let backend = Arc::new(MockProvider::new("mock").with_latency(Duration::from_millis(150)));
    let config = BatchConfig::default()
        .with_max_concurrency(1)
        .with_batch_timeout(Duration::from_millis(50))
        .with_response_timeout_factor(1);
    let (processor, provider) = batching(config, backend.clone());

    let texts = submit_per_model(&provider, &["a", "b", "c"]).await;
    assert_eq!(texts, vec!["echo: for a", "echo: for b", "echo: for c"]);

    processor.drain().await;
    let stats = processor.stats();
    assert_eq!(stats.total_requests, 3);
    assert!(stats.fallback_requests >= 2, "fallbacks {}", stats.fallback_requests);
    // Only a batch already running when its caller gave up can repeat the call.
    assert!(backend.calls() <= 4, "backend calls {}", backend.calls());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abandoned_requests_are_skipped_by_their_batch() {
    let backend = Arc::new(MockProvider::new("mock").with_latency(Duration::from_millis(150)));
    let config = BatchConfig::default()
        .with_max_concurrency(1)
        .with_batch_timeout(Duration::from_millis(20));
    let (processor, provider) = batching(config, backend.clone());

    let texts = submit_per_model(&provider, &["a", "b", "c"]).await;
    assert_eq!(texts.len(), 3);

    processor.drain().await;
    let fallbacks = processor.stats().fallback_requests as usize;
    assert!(fallbacks >= 1);
    // The batch that runs last starts after its caller already went direct.
    assert!(backend.calls() < 3 + fallbacks, "backend calls {}", backend.calls());
}

#[test]
fn test_full_intake_falls_back_after_batch_timeout() {
    // The processor's runtime is never driven, so nothing drains the intake queue.
    let idle = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let config = BatchConfig::default()
        .with_max_batch_size(1)
        .with_max_concurrency(1)
        .with_batch_timeout(Duration::from_millis(20))
        .with_response_timeout_factor(50);
    let processor = {
        let _guard = idle.enter();
        BatchProcessor::new(config)
    };
    let backend = Arc::new(MockProvider::new("mock"));
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let opts = RequestOptions::new("m1");
        let queued = {
            let processor = Arc::clone(&processor);
            let provider: Arc<dyn Provider> = backend.clone();
            let opts = opts.clone();
            tokio::spawn(async move {
                let msgs = vec![Message::user("queued")];
                processor.submit_request(provider, &msgs, &opts).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = Instant::now();
        let overflow = vec![Message::user("overflow")];
        let reply = processor.submit_request(backend.clone(), &overflow, &opts).await.unwrap();
        assert_eq!(reply.text, "echo: overflow");
        assert!(started.elapsed() < Duration::from_millis(500), "waited {:?}", started.elapsed());
        assert_eq!(processor.stats().fallback_requests, 1);
        assert!(!queued.is_finished());

        let reply = queued.await.unwrap().unwrap();
        assert_eq!(reply.text, "echo: queued");
    });
    let stats = processor.stats();
    assert_eq!((stats.total_requests, stats.fallback_requests, stats.total_batches), (2, 2, 0));
    assert_eq!(backend.calls(), 2);
}
