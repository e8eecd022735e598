//! 遥测模块：为二进制与测试安装 tracing 订阅器，并输出引擎统计。
//!
//! # Telemetry
//!
//! The library only emits `tracing` events; it never installs a subscriber on
//! its own. Binaries and tests call [`init_tracing`] once at startup.
//! `RUST_LOG` takes precedence over the default filter.

use crate::pipeline::PipelineStats;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ai_lib_accel=info";

/// Installs a fmt subscriber filtered by `RUST_LOG` (or [`DEFAULT_FILTER`]).
/// Returns `false` when a global subscriber was already set.
pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_FILTER)
}

pub fn init_tracing_with(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Emits one `info` event per engine with its counters as structured fields.
pub fn log_stats(stats: &PipelineStats) {
    if let Some(cache) = &stats.cache {
        info!(
            hits = cache.hits,
            misses = cache.misses,
            evictions = cache.evictions,
            size = cache.size,
            memory_mb = cache.memory_usage_mb,
            hit_rate = cache.hit_rate,
            "cache stats"
        );
    }
    let pool = &stats.pool;
    info!(
        total = pool.total_connections,
        active = pool.active_count,
        idle = pool.idle_count,
        created = pool.created,
        reused = pool.reused,
        discarded = pool.discarded,
        "pool stats"
    );
    if let Some(batch) = &stats.batch {
        info!(
            total_requests = batch.total_requests,
            batched = batch.batched_requests,
            batches = batch.total_batches,
            avg_size = batch.average_batch_size,
            largest = batch.largest_batch,
            fallbacks = batch.fallback_requests,
            "batch stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        assert!(!init_tracing());
    }

    #[test]
    fn test_log_stats_with_disabled_engines() {
        log_stats(&PipelineStats::default());
    }
}
