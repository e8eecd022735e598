//! Batch collection: configuration, requests, and the flush rules.

use crate::provider::Provider;
use crate::tokens::{estimate_cost, estimate_message_tokens};
use crate::types::{content_len, Message, RequestOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::executor::BatchResponse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub enabled: bool,
    pub max_batch_size: usize,
    #[serde(rename = "batch_timeout_ms", with = "crate::config::duration_ms")]
    pub batch_timeout: Duration,
    #[serde(rename = "flush_interval_ms", with = "crate::config::duration_ms")]
    pub flush_interval: Duration,
    pub max_concurrency: usize,
    pub cost_threshold: f64,
    pub token_threshold: usize,
    pub priority_batching: bool,
    /// Response wait as a multiple of `batch_timeout` before falling back.
    pub response_timeout_factor: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_size: 10,
            batch_timeout: Duration::from_millis(100),
            flush_interval: Duration::from_millis(500),
            max_concurrency: 5,
            cost_threshold: 0.01,
            token_threshold: 1000,
            priority_batching: false,
            response_timeout_factor: 10,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, e: bool) -> Self {
        self.enabled = e;
        self
    }
    pub fn with_max_batch_size(mut self, s: usize) -> Self {
        self.max_batch_size = s;
        self
    }
    pub fn with_batch_timeout(mut self, d: Duration) -> Self {
        self.batch_timeout = d;
        self
    }
    pub fn with_flush_interval(mut self, d: Duration) -> Self {
        self.flush_interval = d;
        self
    }
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }
    pub fn with_cost_threshold(mut self, c: f64) -> Self {
        self.cost_threshold = c;
        self
    }
    pub fn with_token_threshold(mut self, t: usize) -> Self {
        self.token_threshold = t;
        self
    }
    pub fn with_priority_batching(mut self, p: bool) -> Self {
        self.priority_batching = p;
        self
    }
    pub fn with_response_timeout_factor(mut self, f: u32) -> Self {
        self.response_timeout_factor = f;
        self
    }

    /// Zero or non-positive limits fall back to the defaults.
    pub fn normalized(mut self) -> Self {
        let d = Self::default();
        if self.max_batch_size == 0 {
            self.max_batch_size = d.max_batch_size;
        }
        if self.batch_timeout.is_zero() {
            self.batch_timeout = d.batch_timeout;
        }
        if self.flush_interval.is_zero() {
            self.flush_interval = d.flush_interval;
        }
        if self.max_concurrency == 0 {
            self.max_concurrency = d.max_concurrency;
        }
        if self.cost_threshold.is_nan() || self.cost_threshold <= 0.0 {
            self.cost_threshold = d.cost_threshold;
        }
        if self.token_threshold == 0 {
            self.token_threshold = d.token_threshold;
        }
        if self.response_timeout_factor == 0 {
            self.response_timeout_factor = d.response_timeout_factor;
        }
        self
    }

    /// Period of the background flush check.
    pub fn tick_period(&self) -> Duration {
        (self.flush_interval.min(self.batch_timeout) / 2).max(Duration::from_millis(1))
    }

    /// How long a submitter waits for its batched response.
    pub fn response_timeout(&self) -> Duration {
        self.batch_timeout * self.response_timeout_factor
    }

    /// Capacity of the shared intake queue.
    pub fn queue_capacity(&self) -> usize {
        self.max_batch_size.saturating_mul(self.max_concurrency).max(1)
    }
}

/// Base 50; shorter prompts and lower temperatures rank higher.
pub fn request_priority(messages: &[Message], options: &RequestOptions) -> u32 {
    let mut priority = 50;
    if content_len(messages) < 1000 {
        priority += 20;
    }
    if options.effective_temperature() < 0.3 {
        priority += 10;
    }
    priority
}

/// One submitted request waiting in a batch.
pub struct BatchRequest {
    pub id: String,
    pub provider: Arc<dyn Provider>,
    pub messages: Vec<Message>,
    pub options: RequestOptions,
    pub priority: u32,
    pub submitted_at: Instant,
    pub(crate) reply: oneshot::Sender<BatchResponse>,
}

impl BatchRequest {
    pub(crate) fn new(
        provider: Arc<dyn Provider>,
        messages: Vec<Message>,
        options: RequestOptions,
        reply: oneshot::Sender<BatchResponse>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            priority: request_priority(&messages, &options),
            provider,
            messages,
            options,
            submitted_at: Instant::now(),
            reply,
        }
    }

    /// Grouping key: the model, plus the priority when priority batching is on.
    pub fn batch_key(&self, priority_batching: bool) -> String {
        if priority_batching {
            format!("{}:{}", self.options.model, self.priority)
        } else {
            self.options.model.clone()
        }
    }
}

impl std::fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRequest")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("model", &self.options.model)
            .field("priority", &self.priority)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Why a batch left the pending map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Size,
    Age,
    Cost,
    Tokens,
    Idle,
    Shutdown,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Size => "size",
            FlushReason::Age => "age",
            FlushReason::Cost => "cost",
            FlushReason::Tokens => "tokens",
            FlushReason::Idle => "idle",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug)]
pub struct Batch {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub requests: Vec<BatchRequest>,
    pub created_at: Instant,
    pub last_updated: Instant,
    pub total_tokens: usize,
    pub total_cost: f64,
    pub priority: u32,
    pub status: BatchStatus,
}

impl Batch {
    pub fn new(provider: &str, model: &str, priority: u32, capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            requests: Vec::with_capacity(capacity),
            created_at: now,
            last_updated: now,
            total_tokens: 0,
            total_cost: 0.0,
            priority,
            status: BatchStatus::Pending,
        }
    }

    pub fn push(&mut self, request: BatchRequest) {
        let tokens = estimate_message_tokens(&request.messages);
        self.total_tokens += tokens;
        self.total_cost += estimate_cost(tokens);
        self.last_updated = Instant::now();
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Triggers checked when a request is appended.
    pub fn ready(&self, config: &BatchConfig, now: Instant) -> Option<FlushReason> {
        if self.len() >= config.max_batch_size {
            Some(FlushReason::Size)
        } else if now.saturating_duration_since(self.created_at) >= config.batch_timeout {
            Some(FlushReason::Age)
        } else if self.total_cost >= config.cost_threshold {
            Some(FlushReason::Cost)
        } else if self.total_tokens >= config.token_threshold {
            Some(FlushReason::Tokens)
        } else {
            None
        }
    }

    /// Triggers checked by the background tick: the append triggers plus
    /// inactivity longer than `flush_interval`.
    pub fn due(&self, config: &BatchConfig, now: Instant) -> Option<FlushReason> {
        self.ready(config, now).or_else(|| {
            let idle = now.saturating_duration_since(self.last_updated);
            (idle >= config.flush_interval).then_some(FlushReason::Idle)
        })
    }
}
