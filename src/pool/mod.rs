//! 连接池模块：按键复用后端实例，限制同时租用的连接数。
//!
//! # Connection Pool
//!
//! Keyed pool of backend instances. Idle valid connections are reused; new
//! ones are created through a [`ProviderFactory`](crate::registry::ProviderFactory)
//! until `max_active` connections are leased, after which acquisition fails
//! immediately with [`Error::PoolExhausted`](crate::Error::PoolExhausted).
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ConnectionPool`] | Lease, return, sweep, stats, close |
//! | [`PoolConfig`] | Idle and active caps, lifetimes, per-connection usage cap |
//! | [`PooledProvider`] | A lease; returns itself after one call or on drop |
//! | [`PoolBackedProvider`] | `Provider` that leases per call |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_accel::pool::{ConnectionPool, PoolConfig};
//! use ai_lib_accel::provider::ProviderConfig;
//! use ai_lib_accel::testing::MockFactory;
//! use std::sync::Arc;
//!
//! let factory = Arc::new(MockFactory::new("mock"));
//! let pool = ConnectionPool::new(PoolConfig::new().with_max_active(2), factory);
//! let cfg = ProviderConfig::new("mock", "m1");
//! let _a = pool.get_provider("k", &cfg).unwrap();
//! let _b = pool.get_provider("k", &cfg).unwrap();
//! assert!(pool.get_provider("k", &cfg).unwrap_err().is_pool_exhausted());
//! ```

mod connection;
mod lease;
mod manager;
mod provider;

pub use connection::PooledConnection;
pub use lease::PooledProvider;
pub use manager::{ConnectionPool, PoolConfig, PoolStats};
pub use provider::PoolBackedProvider;
