use crate::provider::Provider;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A backend instance tracked by the pool.
#[derive(Clone)]
pub struct PooledConnection {
    pub id: u64,
    pub provider: Arc<dyn Provider>,
    pub created_at: Instant,
    pub last_used: Instant,
    pub in_use: bool,
    pub usage_count: u64,
    pub max_usage: u64,
}

impl PooledConnection {
    /// A freshly created connection, already leased once.
    pub fn leased(id: u64, provider: Arc<dyn Provider>, max_usage: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            provider,
            created_at: now,
            last_used: now,
            in_use: true,
            usage_count: 1,
            max_usage,
        }
    }

    pub fn is_valid(&self, max_lifetime: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) <= max_lifetime
            && self.usage_count < self.max_usage
    }

    /// Idle connection that the sweep should discard.
    pub fn is_stale(&self, idle_timeout: Duration, max_lifetime: Duration, now: Instant) -> bool {
        !self.in_use
            && (now.saturating_duration_since(self.last_used) > idle_timeout
                || now.saturating_duration_since(self.created_at) > max_lifetime)
    }

    pub(crate) fn lease(&mut self, now: Instant) {
        self.in_use = true;
        self.usage_count += 1;
        self.last_used = now;
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("in_use", &self.in_use)
            .field("usage_count", &self.usage_count)
            .field("max_usage", &self.max_usage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    #[test]
    fn test_validity_limits() {
        let mut conn = PooledConnection::leased(1, Arc::new(MockProvider::new("m")), 2);
        let now = Instant::now();
        assert!(conn.is_valid(Duration::from_secs(60), now));
        conn.lease(now);
        assert_eq!(conn.usage_count, 2);
        assert!(!conn.is_valid(Duration::from_secs(60), now));

        let fresh = PooledConnection::leased(2, Arc::new(MockProvider::new("m")), 10);
        let later = now + Duration::from_secs(120);
        assert!(!fresh.is_valid(Duration::from_secs(60), later));
    }

    #[test]
    fn test_stale_only_when_idle() {
        let mut conn = PooledConnection::leased(1, Arc::new(MockProvider::new("m")), 10);
        let later = Instant::now() + Duration::from_secs(600);
        assert!(!conn.is_stale(Duration::from_secs(1), Duration::from_secs(3600), later));
        conn.in_use = false;
        assert!(conn.is_stale(Duration::from_secs(1), Duration::from_secs(3600), later));
        assert!(!conn.is_stale(Duration::from_secs(3600), Duration::from_secs(3600), later));
    }
}
