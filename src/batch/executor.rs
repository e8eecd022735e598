//! Batch execution.

use super::collector::{Batch, BatchRequest, BatchStatus};
use crate::types::ProviderResponse;
use crate::Result;
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one request within a batch.
#[derive(Debug)]
pub struct BatchResponse {
    pub id: String,
    pub result: Result<ProviderResponse>,
    /// Time from batch start until this request finished.
    pub duration: Duration,
}

/// Summary of a processed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub size: usize,
    pub failed: usize,
    pub undelivered: usize,
    pub status: BatchStatus,
    pub elapsed: Duration,
}

async fn execute_request(
    request: BatchRequest,
    started: Instant,
) -> (BatchRequest, Option<BatchResponse>) {
    // A submitter that stopped waiting has already retried directly.
    if request.reply.is_closed() {
        return (request, None);
    }
    let result = request.provider.generate(&request.messages, &request.options).await;
    let response = BatchResponse {
        id: request.id.clone(),
        result,
        duration: started.elapsed(),
    };
    (request, Some(response))
}

/// Runs every request of `batch` with at most `max_concurrency` in flight and
/// delivers each result to its submitter as soon as it is ready. Requests
/// whose submitter is gone are skipped and counted as undelivered.
pub async fn execute_batch(mut batch: Batch, max_concurrency: usize) -> BatchOutcome {
    batch.status = BatchStatus::Processing;
    let started = Instant::now();
    let size = batch.len();
    let requests = std::mem::take(&mut batch.requests);

    let mut results = stream::iter(requests)
        .map(|req| execute_request(req, started))
        .buffer_unordered(max_concurrency.max(1));

    let (mut failed, mut undelivered) = (0, 0);
    while let Some((request, response)) = results.next().await {
        let Some(response) = response else {
            undelivered += 1;
            debug!(batch = %batch.id, request = %request.id, "submitter gone; request skipped");
            continue;
        };
        if response.result.is_err() {
            failed += 1;
        }
        if request.reply.send(response).is_err() {
            undelivered += 1;
            warn!(
                batch = %batch.id,
                request = %request.id,
                "submitter gone; batched response dropped"
            );
        }
    }

    batch.status = if size > 0 && failed == size {
        BatchStatus::Failed
    } else {
        BatchStatus::Completed
    };
    let elapsed = started.elapsed();
    debug!(
        batch = %batch.id,
        size,
        failed,
        elapsed_ms = elapsed.as_millis() as u64,
        "batch processed"
    );
    BatchOutcome {
        batch_id: batch.id,
        size,
        failed,
        undelivered,
        status: batch.status,
        elapsed,
    }
}
