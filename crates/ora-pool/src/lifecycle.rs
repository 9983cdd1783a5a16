//! Connection lifecycle bookkeeping and health checks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ora_client::Connection;

use crate::config::PingInterval;

/// Pool-side record of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Client side connection id.
    pub id: u64,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out.
    pub last_checkout: Option<Instant>,
    /// Number of times the connection was checked out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_checkout: None,
            checkout_count: 0,
        }
    }

    pub(crate) fn record_checkout(&mut self) {
        self.last_checkout = Some(Instant::now());
        self.checkout_count += 1;
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Outcome of the check a free connection goes through before it is
/// handed out.
#[derive(Debug, Clone)]
pub enum HealthCheckResult {
    /// Usable; no ping was needed.
    Healthy,
    /// Usable; answered a ping.
    Pinged,
    /// The transport is gone or unhealthy.
    Disconnected,
    /// The ping failed.
    PingFailed(ora_client::Error),
}

impl HealthCheckResult {
    /// Whether the connection may be handed out.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Healthy | Self::Pinged)
    }

    /// Whether a ping round trip was made.
    #[must_use]
    pub fn pinged(&self) -> bool {
        matches!(self, Self::Pinged | Self::PingFailed(_))
    }
}

/// Hook run on a pooled session the first time it is handed out, to set
/// session state (NLS settings, module names, ...) once per session.
///
/// A failing hook makes the acquire fail with its error; the connection is
/// closed rather than returned to the pool.
#[async_trait]
pub trait SessionInit: Send + Sync {
    /// Prepare a freshly created session.
    async fn init_session(&self, conn: &Connection) -> ora_client::Result<()>;
}

/// Check `conn` without a round trip, then ping it if `ping_interval`
/// requires it for its current idle time.
pub async fn check_connection(conn: &Connection, ping_interval: PingInterval) -> HealthCheckResult {
    if !conn.is_healthy() {
        return HealthCheckResult::Disconnected;
    }
    if !ping_interval.should_ping(conn.idle_time()) {
        return HealthCheckResult::Healthy;
    }
    match conn.ping().await {
        Ok(()) => HealthCheckResult::Pinged,
        Err(e) => HealthCheckResult::PingFailed(e),
    }
}
