//! Connection pool manager.

use super::connection::PooledConnection;
use super::lease::PooledProvider;
use crate::provider::{Provider, ProviderConfig};
use crate::registry::ProviderFactory;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_idle: usize,
    pub max_active: usize,
    #[serde(rename = "idle_timeout_ms", with = "crate::config::duration_ms")]
    pub idle_timeout: Duration,
    #[serde(rename = "max_lifetime_ms", with = "crate::config::duration_ms")]
    pub max_lifetime: Duration,
    pub max_requests_per_connection: u64,
    #[serde(rename = "cleanup_interval_ms", with = "crate::config::duration_ms")]
    pub cleanup_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 10,
            max_active: 50,
            idle_timeout: Duration::from_secs(5 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
            max_requests_per_connection: 1000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }
    pub fn with_max_active(mut self, n: usize) -> Self {
        self.max_active = n;
        self
    }
    pub fn with_idle_timeout(mut self, d: Duration) -> Self {
        self.idle_timeout = d;
        self
    }
    pub fn with_max_lifetime(mut self, d: Duration) -> Self {
        self.max_lifetime = d;
        self
    }
    pub fn with_max_requests_per_connection(mut self, n: u64) -> Self {
        self.max_requests_per_connection = n;
        self
    }
    pub fn with_cleanup_interval(mut self, d: Duration) -> Self {
        self.cleanup_interval = d;
        self
    }

    /// Zero limits fall back to the defaults.
    pub fn normalized(mut self) -> Self {
        let d = Self::default();
        if self.max_idle == 0 {
            self.max_idle = d.max_idle;
        }
        if self.max_active == 0 {
            self.max_active = d.max_active;
        }
        if self.idle_timeout.is_zero() {
            self.idle_timeout = d.idle_timeout;
        }
        if self.max_lifetime.is_zero() {
            self.max_lifetime = d.max_lifetime;
        }
        if self.max_requests_per_connection == 0 {
            self.max_requests_per_connection = d.max_requests_per_connection;
        }
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = d.cleanup_interval;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total_connections: usize,
    pub active_count: usize,
    pub idle_count: usize,
    pub max_idle: usize,
    pub max_active: usize,
    pub created: u64,
    pub reused: u64,
    pub discarded: u64,
}

#[derive(Default)]
struct PoolState {
    connections: HashMap<String, Vec<PooledConnection>>,
    next_id: u64,
    created: u64,
    reused: u64,
    discarded: u64,
    closed: bool,
}

impl PoolState {
    fn all(&self) -> impl Iterator<Item = &PooledConnection> {
        self.connections.values().flatten()
    }

    fn active_count(&self) -> usize {
        self.all().filter(|c| c.in_use).count()
    }

    fn idle_count(&self) -> usize {
        self.all().filter(|c| !c.in_use).count()
    }
}

/// Keyed pool of reusable backend instances with a hard cap on leases.
///
/// Acquisition never blocks: when `max_active` connections are leased the
/// call fails with [`Error::PoolExhausted`].
pub struct ConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn ProviderFactory>,
    state: Mutex<PoolState>,
    shutdown: CancellationToken,
}

impl ConnectionPool {
    /// Creates the pool and, when called inside a tokio runtime, starts the
    /// idle sweep.
    pub fn new(config: PoolConfig, factory: Arc<dyn ProviderFactory>) -> Arc<Self> {
        let config = config.normalized();
        info!(
            max_idle = config.max_idle,
            max_active = config.max_active,
            factory = factory.name(),
            "connection pool started"
        );
        let pool = Arc::new(Self {
            config,
            factory,
            state: Mutex::new(PoolState::default()),
            shutdown: CancellationToken::new(),
        });
        pool.spawn_sweeper();
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Leases a connection for `key`, reusing an idle valid one when possible
    /// and creating one through the factory otherwise.
    pub fn get_provider(
        self: &Arc<Self>,
        key: &str,
        config: &ProviderConfig,
    ) -> Result<PooledProvider> {
        let now = Instant::now();
        let mut state = self.lock();
        if state.closed {
            return Err(Error::runtime_with_context(
                "connection pool is closed",
                ErrorContext::new().with_source("connection_pool"),
            ));
        }

        if let Some((id, provider)) = self.lease_idle(&mut state, key, now) {
            state.reused += 1;
            debug!(key, id, "reusing pooled connection");
            return Ok(PooledProvider::new(Arc::clone(self), key, id, provider));
        }

        let active_count = state.active_count();
        if active_count >= self.config.max_active {
            warn!(
                key,
                active_count,
                max_active = self.config.max_active,
                "connection pool exhausted"
            );
            return Err(Error::PoolExhausted {
                limit: "max_active_exceeded",
                active_count,
                max_active: self.config.max_active,
            });
        }

        let provider = self.factory.create(config)?;
        state.next_id += 1;
        let id = state.next_id;
        state
            .connections
            .entry(key.to_string())
            .or_default()
            .push(PooledConnection::leased(
                id,
                Arc::clone(&provider),
                self.config.max_requests_per_connection,
            ));
        state.created += 1;
        debug!(key, id, active = active_count + 1, "created pooled connection");
        Ok(PooledProvider::new(Arc::clone(self), key, id, provider))
    }

    /// Marks a leased connection idle, or discards it when it is no longer
    /// valid or the pool already holds `max_idle` idle connections.
    pub(crate) fn release(&self, key: &str, id: u64) {
        let now = Instant::now();
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let idle_others = state.idle_count();
        let (max_lifetime, max_idle) = (self.config.max_lifetime, self.config.max_idle);
        let Some(conns) = state.connections.get_mut(key) else { return };
        let Some(pos) = conns.iter().position(|c| c.id == id) else { return };

        let keep = conns[pos].is_valid(max_lifetime, now) && idle_others < max_idle;
        if keep {
            conns[pos].in_use = false;
            conns[pos].last_used = now;
        } else {
            conns.swap_remove(pos);
        }
        if conns.is_empty() {
            state.connections.remove(key);
        }
        if !keep {
            state.discarded += 1;
        }
        debug!(key, id, kept = keep, "returned pooled connection");
    }

    /// Discards idle connections past their idle timeout or lifetime.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let (idle_timeout, max_lifetime) = (self.config.idle_timeout, self.config.max_lifetime);
        let mut state = self.lock();
        let mut removed = 0;
        for conns in state.connections.values_mut() {
            let before = conns.len();
            conns.retain(|c| !c.is_stale(idle_timeout, max_lifetime, now));
            removed += before - conns.len();
        }
        state.connections.retain(|_, conns| !conns.is_empty());
        state.discarded += removed as u64;
        if removed > 0 {
            debug!(removed, "swept idle connections");
        }
        removed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            total_connections: state.all().count(),
            active_count: state.active_count(),
            idle_count: state.idle_count(),
            max_idle: self.config.max_idle,
            max_active: self.config.max_active,
            created: state.created,
            reused: state.reused,
            discarded: state.discarded,
        }
    }

    /// Stops the sweep and drops every connection. Outstanding leases stay
    /// usable until they return; later acquisitions fail.
    pub fn close(&self) {
        self.shutdown.cancel();
        let mut state = self.lock();
        let dropped = state.all().count();
        state.connections.clear();
        state.discarded += dropped as u64;
        state.closed = true;
        info!(dropped, "connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Leases the first idle valid connection for `key`, discarding idle
    /// invalid ones on the way.
    fn lease_idle(
        &self,
        state: &mut PoolState,
        key: &str,
        now: Instant,
    ) -> Option<(u64, Arc<dyn Provider>)> {
        let max_lifetime = self.config.max_lifetime;
        let conns = state.connections.get_mut(key)?;
        let before = conns.len();
        conns.retain(|c| c.in_use || c.is_valid(max_lifetime, now));
        let dropped = (before - conns.len()) as u64;
        let found = conns.iter_mut().find(|c| !c.in_use).map(|c| {
            c.lease(now);
            (c.id, Arc::clone(&c.provider))
        });
        if conns.is_empty() {
            state.connections.remove(key);
        }
        state.discarded += dropped;
        found
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; connection sweep disabled");
            return;
        };
        let weak = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let period = self.config.cleanup_interval;
        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(pool) = weak.upgrade() else { break };
                        pool.sweep();
                    }
                }
            }
        });
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
