//! Benchmarks for the response cache
//!
//! This benchmark measures:
//! - Request fingerprinting for growing conversations
//! - Hit lookups on a warm cache
//! - Inserts that force eviction passes at the entry limit

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ai_lib_accel::cache::{CacheConfig, CacheKeyGenerator, ResponseCache};
use ai_lib_accel::types::{Message, RequestOptions, ResponseMetadata};

fn conversation(turns: usize) -> Vec<Message> {
    (0..turns)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("question number {} about caching behaviour", i))
            } else {
                Message::assistant(format!("answer number {} with some supporting detail", i))
            }
        })
        .collect()
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let keygen = CacheKeyGenerator::new();
    let options = RequestOptions::new("gpt-4o-mini").with_temperature(0.7).with_max_tokens(256);

    for turns in [1usize, 10, 100] {
        let messages = conversation(turns);
        group.throughput(Throughput::Elements(turns as u64));
        group.bench_with_input(BenchmarkId::from_parameter(turns), &messages, |b, messages| {
            b.iter(|| keygen.generate(black_box(messages), black_box(&options), "openai"))
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let cache = ResponseCache::new(CacheConfig::default().with_max_entries(10_000));
    let options = RequestOptions::new("gpt-4o-mini");
    let metadata = ResponseMetadata::default();
    let prompts: Vec<Vec<Message>> = (0..1000)
        .map(|i| vec![Message::user(format!("prompt {}", i))])
        .collect();
    for prompt in &prompts {
        cache.set(prompt, &options, "openai", "cached answer", &metadata);
    }

    c.bench_function("cache_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % prompts.len();
            black_box(cache.get(&prompts[i], &options, "openai"))
        })
    });
}

fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_at_capacity");
    let options = RequestOptions::new("gpt-4o-mini");
    let metadata = ResponseMetadata::default();

    for capacity in [100usize, 1000] {
        let cache = ResponseCache::new(CacheConfig::default().with_max_entries(capacity));
        for i in 0..capacity {
            let msgs = [Message::user(format!("warm {}", i))];
            cache.set(&msgs, &options, "openai", "answer", &metadata);
        }
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                let msgs = [Message::user(format!("fresh {}", i))];
                cache.set(&msgs, &options, "openai", "answer", &metadata);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_lookup, bench_eviction);
criterion_main!(benches);
