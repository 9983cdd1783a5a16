//! # ora-driver-pool
//!
//! Connection pool for the Oracle thin driver.
//!
//! Connections are opened by a single background task, handed to waiting
//! callers in arrival order and health checked before each reuse. Surplus
//! idle connections are closed after `idle_timeout`. Pools over DRCP pooled
//! servers get a connection class and release their server sessions on
//! close.
//!
//! ## Features
//!
//! - Configurable min/max pool sizes and growth increment
//! - Liveness check plus policy-driven ping on acquire
//! - FIFO waiter queue with optional acquire timeout
//! - Idle eviction down to the minimum size
//! - Access token refresh before each connection is created
//! - Per-session init hook and draining close
//! - Status snapshot and checkout/health-check metrics
//!
//! ## Example
//!
//! ```rust,ignore
//! use ora_driver_pool::{PingInterval, Pool, PoolConfig};
//! use std::time::Duration;
//!
//! let config = PoolConfig::new()
//!     .min_connections(4)
//!     .max_connections(10)
//!     .increment(2)
//!     .idle_timeout(Duration::from_secs(300))
//!     .ping_interval(PingInterval::from_secs(60));
//!
//! let pool = Pool::new(connector, params, config).await?;
//!
//! // Get a connection from the pool
//! let conn = pool.acquire().await?;
//! conn.execute("update emp set sal = sal * 1.1").await?;
//! conn.commit().await?;
//! // Returned to the pool on release or drop
//! conn.release();
//!
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! pool.close().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::{PingInterval, PoolConfig};

// Error types
pub use error::{PoolError, Result};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};

// Lifecycle management
pub use lifecycle::{ConnectionMetadata, HealthCheckResult, SessionInit, check_connection};
