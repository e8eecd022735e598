//! 请求合并模块：将同一模型的并发请求合并为批次处理。
//!
//! # Batch Coalescer
//!
//! Concurrent `generate` calls for the same model are collected into a
//! batch that is processed once it is full, old enough, expensive enough, or
//! idle. Each submitter receives exactly its own result, and falls back to a
//! direct call instead of waiting indefinitely.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchProcessor`] | Intake queue, pending batches, flush ticker, stats |
//! | [`BatchConfig`] | Size, timing, cost and token thresholds |
//! | [`Batch`] / [`BatchRequest`] | A pending group and its members |
//! | [`execute_batch`] | Bounded concurrent execution with per-request delivery |
//! | [`BatchingProvider`] | `Provider` wrapper that batches `generate` |
//!
//! ## Flush triggers
//!
//! A batch is flushed when it reaches `max_batch_size`, when it is older than
//! `batch_timeout`, when its estimated cost or token count crosses a
//! threshold, or (on the background tick) when nothing was appended for
//! `flush_interval`.

mod collector;
mod executor;
mod processor;
mod provider;

pub use collector::{request_priority, Batch, BatchConfig, BatchRequest, BatchStatus, FlushReason};
pub use executor::{execute_batch, BatchOutcome, BatchResponse};
pub use processor::{BatchProcessor, BatchStats};
pub use provider::BatchingProvider;
