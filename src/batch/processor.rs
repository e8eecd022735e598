//! Batch processor: intake queue, pending batches, background flushing.

use super::collector::{Batch, BatchConfig, BatchRequest, FlushReason};
use super::executor::{execute_batch, BatchOutcome};
use crate::provider::Provider;
use crate::types::{Message, ProviderResponse, RequestOptions};
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Notify, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub total_requests: u64,
    pub batched_requests: u64,
    pub total_batches: u64,
    pub average_batch_size: f64,
    /// Running average of requests completed per second of batch processing.
    pub batch_efficiency: f64,
    pub fallback_requests: u64,
    pub largest_batch: usize,
}

impl BatchStats {
    fn record(&mut self, outcome: &BatchOutcome) {
        self.total_batches += 1;
        self.batched_requests += outcome.size as u64;
        self.largest_batch = self.largest_batch.max(outcome.size);
        let n = self.total_batches as f64;
        let efficiency = outcome.size as f64 / outcome.elapsed.as_secs_f64().max(1e-6);
        self.average_batch_size += (outcome.size as f64 - self.average_batch_size) / n;
        self.batch_efficiency += (efficiency - self.batch_efficiency) / n;
    }
}

#[derive(Default)]
struct BatchState {
    pending: HashMap<String, Batch>,
    in_flight: usize,
    stats: BatchStats,
}

fn lock(state: &Mutex<BatchState>) -> MutexGuard<'_, BatchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coalesces concurrent `generate` calls into batches keyed by model.
///
/// Submitters never wait indefinitely: if the intake queue stays full, no
/// response arrives in time, or the processor has shut down, the request is
/// sent straight to its provider.
pub struct BatchProcessor {
    config: BatchConfig,
    intake: mpsc::Sender<BatchRequest>,
    state: Arc<Mutex<BatchState>>,
    permits: Arc<Semaphore>,
    drained: Arc<Notify>,
    runtime: Option<Handle>,
    shutdown: CancellationToken,
}

impl BatchProcessor {
    /// Creates the processor. Outside a tokio runtime nothing is batched and
    /// every submission goes directly to its provider.
    pub fn new(config: BatchConfig) -> Arc<Self> {
        let config = config.normalized();
        let (intake, receiver) = mpsc::channel(config.queue_capacity());
        let runtime = Handle::try_current().ok();
        let processor = Arc::new(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            drained: Arc::new(Notify::new()),
            config,
            intake,
            state: Arc::new(Mutex::new(BatchState::default())),
            runtime,
            shutdown: CancellationToken::new(),
        });
        match &processor.runtime {
            Some(handle) => {
                let shutdown = processor.shutdown.clone();
                handle.spawn(intake_loop(Arc::downgrade(&processor), receiver, shutdown));
                handle.spawn(tick_loop(Arc::downgrade(&processor), processor.shutdown.clone()));
                info!(
                    max_batch_size = processor.config.max_batch_size,
                    batch_timeout_ms = processor.config.batch_timeout.as_millis() as u64,
                    max_concurrency = processor.config.max_concurrency,
                    "batch processor started"
                );
            }
            None => debug!("no tokio runtime; batching disabled, requests go direct"),
        }
        processor
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Submits a request for batching and waits for its own result.
    pub async fn submit_request(
        &self,
        provider: Arc<dyn Provider>,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        lock(&self.state).stats.total_requests += 1;
        if self.runtime.is_none() || self.shutdown.is_cancelled() {
            return self.direct(&provider, messages, options, "not accepting").await;
        }

        let (reply, receiver) = oneshot::channel();
        let request =
            BatchRequest::new(Arc::clone(&provider), messages.to_vec(), options.clone(), reply);
        let id = request.id.clone();
        match tokio::time::timeout(self.config.batch_timeout, self.intake.send(request)).await {
            Ok(Ok(())) => {
                debug!(request = %id, model = %options.model, "request queued for batching")
            }
            Ok(Err(_)) => return self.direct(&provider, messages, options, "intake closed").await,
            Err(_) => return self.direct(&provider, messages, options, "intake full").await,
        }

        match tokio::time::timeout(self.config.response_timeout(), receiver).await {
            Ok(Ok(response)) => response.result,
            Ok(Err(_)) => self.direct(&provider, messages, options, "batch abandoned").await,
            Err(_) => self.direct(&provider, messages, options, "response timeout").await,
        }
    }

    pub fn stats(&self) -> BatchStats {
        lock(&self.state).stats.clone()
    }

    pub fn pending_batches(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn pending_requests(&self) -> usize {
        lock(&self.state).pending.values().map(Batch::len).sum()
    }

    /// Batches flushed but not yet finished.
    pub fn in_flight_batches(&self) -> usize {
        lock(&self.state).in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until every flushed batch has finished processing.
    pub async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            if lock(&self.state).in_flight == 0 {
                return;
            }
            notified.await;
        }
    }

    /// [`close`](Self::close) followed by [`drain`](Self::drain).
    pub async fn shutdown(&self) {
        self.close();
        self.drain().await;
    }

    /// Stops intake and the ticker and flushes every pending batch. Batches
    /// already processing run to completion. Later calls do nothing.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        let flushed = self.flush_all();
        info!(flushed, "batch processor closed");
    }

    async fn direct(
        &self,
        provider: &Arc<dyn Provider>,
        messages: &[Message],
        options: &RequestOptions,
        reason: &'static str,
    ) -> Result<ProviderResponse> {
        lock(&self.state).stats.fallback_requests += 1;
        if self.shutdown.is_cancelled() {
            debug!(reason, model = %options.model, "batching bypassed");
        } else {
            warn!(reason, model = %options.model, "batching bypassed; calling provider directly");
        }
        provider.generate(messages, options).await
    }

    fn append(&self, request: BatchRequest) {
        let key = request.batch_key(self.config.priority_batching);
        let now = Instant::now();
        let ready = {
            let mut state = lock(&self.state);
            let capacity = self.config.max_batch_size;
            let batch = state
                .pending
                .entry(key.clone())
                .or_insert_with(|| {
                    Batch::new(
                        request.provider.name(),
                        &request.options.model,
                        request.priority,
                        capacity,
                    )
                });
            batch.push(request);
            let reason = batch.ready(&self.config, now);
            let flushed = reason.and_then(|r| state.pending.remove(&key).map(|b| (b, r)));
            flushed
        };
        if let Some((batch, reason)) = ready {
            self.dispatch(batch, reason);
        }
    }

    /// Flushes batches whose triggers fired since the last tick.
    fn flush_due(&self) -> usize {
        let now = Instant::now();
        let due: Vec<(Batch, FlushReason)> = {
            let mut state = lock(&self.state);
            let keys: Vec<(String, FlushReason)> = state
                .pending
                .iter()
                .filter_map(|(k, b)| b.due(&self.config, now).map(|r| (k.clone(), r)))
                .collect();
            let removed: Vec<(Batch, FlushReason)> = keys
                .into_iter()
                .filter_map(|(k, r)| state.pending.remove(&k).map(|b| (b, r)))
                .collect();
            removed
        };
        let count = due.len();
        for (batch, reason) in due {
            self.dispatch(batch, reason);
        }
        count
    }

    fn flush_all(&self) -> usize {
        let drained: Vec<Batch> = lock(&self.state).pending.drain().map(|(_, b)| b).collect();
        let count = drained.len();
        for batch in drained {
            self.dispatch(batch, FlushReason::Shutdown);
        }
        count
    }

    fn dispatch(&self, batch: Batch, reason: FlushReason) {
        let Some(handle) = &self.runtime else {
            warn!(batch = %batch.id, "no runtime to process batch; submitters will fall back");
            return;
        };
        info!(
            batch = %batch.id,
            model = %batch.model,
            size = batch.len(),
            reason = reason.as_str(),
            "flushing batch"
        );
        let permits = Arc::clone(&self.permits);
        let state = Arc::clone(&self.state);
        let drained = Arc::clone(&self.drained);
        let max_concurrency = self.config.max_concurrency;
        lock(&state).in_flight += 1;
        handle.spawn(async move {
            if let Ok(_permit) = permits.acquire_owned().await {
                let outcome = execute_batch(batch, max_concurrency).await;
                lock(&state).stats.record(&outcome);
            }
            lock(&state).in_flight -= 1;
            drained.notify_waiters();
        });
    }
}

impl Drop for BatchProcessor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn intake_loop(
    processor: Weak<BatchProcessor>,
    mut receiver: mpsc::Receiver<BatchRequest>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = receiver.recv() => {
                let Some(request) = request else { return };
                let Some(processor) = processor.upgrade() else { return };
                processor.append(request);
            }
        }
    }
    // Requests already queued at shutdown still get a batch.
    receiver.close();
    let Some(processor) = processor.upgrade() else { return };
    while let Ok(request) = receiver.try_recv() {
        processor.append(request);
    }
    processor.flush_all();
}

async fn tick_loop(processor: Weak<BatchProcessor>, shutdown: CancellationToken) {
    let period = match processor.upgrade() {
        Some(p) => p.config.tick_period(),
        None => return,
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(processor) = processor.upgrade() else { break };
                processor.flush_due();
            }
        }
    }
}
