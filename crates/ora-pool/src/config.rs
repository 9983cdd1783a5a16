//! Pool configuration.

use std::time::Duration;

use ora_client::config::DEFAULT_STMT_CACHE_SIZE;

use crate::error::PoolError;

/// When a free connection is pinged before being handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingInterval {
    /// Never ping.
    Never,
    /// Ping on every acquire.
    Always,
    /// Ping when the connection has been idle longer than this.
    IdleLongerThan(Duration),
}

impl PingInterval {
    /// Interpret a `pool_ping_interval` in seconds: negative disables pings,
    /// zero pings on every acquire.
    #[must_use]
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            s if s < 0 => Self::Never,
            0 => Self::Always,
            s => Self::IdleLongerThan(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// The interval in seconds, `-1` when disabled.
    #[must_use]
    pub fn as_secs(&self) -> i64 {
        match self {
            Self::Never => -1,
            Self::Always => 0,
            Self::IdleLongerThan(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Whether a connection idle for `idle` must be pinged.
    #[must_use]
    pub fn should_ping(&self, idle: Duration) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::IdleLongerThan(limit) => idle > *limit,
        }
    }
}

impl Default for PingInterval {
    fn default() -> Self {
        Self::IdleLongerThan(Duration::from_secs(60))
    }
}

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections kept open even when idle.
    pub min_connections: u32,

    /// Upper bound on open connections.
    pub max_connections: u32,

    /// Connections created at once when waiters are queued.
    pub increment: u32,

    /// Idle time after which surplus free connections are closed.
    /// `Duration::ZERO` disables eviction.
    pub idle_timeout: Duration,

    /// Health check policy applied on acquire.
    pub ping_interval: PingInterval,

    /// Statement cache size of each pooled connection.
    pub stmt_cache_size: usize,

    /// All connections share the pool credentials. Must be `true`.
    pub homogeneous: bool,

    /// DRCP connection class applied to new sessions.
    pub connection_class: Option<String>,

    /// Fail instead of queueing concurrent use of one connection.
    pub error_on_concurrent_execute: bool,

    /// How long `acquire` waits for a connection. `None` waits forever.
    pub acquire_timeout: Option<Duration>,

    /// Pause after a failed creation nobody was waiting for.
    pub creation_retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: 4,
            increment: 1,
            idle_timeout: Duration::from_secs(60),
            ping_interval: PingInterval::default(),
            stmt_cache_size: DEFAULT_STMT_CACHE_SIZE,
            homogeneous: true,
            connection_class: None,
            error_on_concurrent_execute: false,
            acquire_timeout: None,
            creation_retry_delay: Duration::from_secs(1),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the growth increment.
    #[must_use]
    pub fn increment(mut self, count: u32) -> Self {
        self.increment = count;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the ping policy.
    #[must_use]
    pub fn ping_interval(mut self, interval: PingInterval) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the per-connection statement cache size.
    #[must_use]
    pub fn stmt_cache_size(mut self, size: usize) -> Self {
        self.stmt_cache_size = size;
        self
    }

    /// Request a homogeneous or heterogeneous pool.
    #[must_use]
    pub fn homogeneous(mut self, homogeneous: bool) -> Self {
        self.homogeneous = homogeneous;
        self
    }

    /// Set the DRCP connection class.
    #[must_use]
    pub fn connection_class(mut self, class: impl Into<String>) -> Self {
        self.connection_class = Some(class.into());
        self
    }

    /// Fail instead of queueing concurrent use of a connection.
    #[must_use]
    pub fn error_on_concurrent_execute(mut self, enabled: bool) -> Self {
        self.error_on_concurrent_execute = enabled;
        self
    }

    /// Bound how long `acquire` waits.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set the pause after an unattended creation failure.
    #[must_use]
    pub fn creation_retry_delay(mut self, delay: Duration) -> Self {
        self.creation_retry_delay = delay;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if !self.homogeneous {
            return Err(PoolError::HeterogeneousUnsupported);
        }

        if self.max_connections == 0 {
            return Err(PoolError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(PoolError::Config(
                "min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.increment == 0 {
            return Err(PoolError::Config("increment must be at least 1".into()));
        }

        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(PoolError::Config(
                "acquire_timeout must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.increment, 1);
        assert_eq!(config.stmt_cache_size, 30);
        assert!(config.acquire_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = PoolConfig::new().min_connections(5).max_connections(2);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));

        let config = PoolConfig::new().max_connections(0);
        assert!(config.validate().is_err());

        let config = PoolConfig::new().increment(0);
        assert!(config.validate().is_err());

        let config = PoolConfig::new().min_connections(4).max_connections(4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_heterogeneous_rejected() {
        let config = PoolConfig::new().homogeneous(false);
        assert!(matches!(
            config.validate(),
            Err(PoolError::HeterogeneousUnsupported)
        ));
    }

    #[test]
    fn test_ping_interval_from_secs() {
        assert_eq!(PingInterval::from_secs(-5), PingInterval::Never);
        assert_eq!(PingInterval::from_secs(0), PingInterval::Always);
        assert_eq!(
            PingInterval::from_secs(60),
            PingInterval::IdleLongerThan(Duration::from_secs(60))
        );
        assert_eq!(PingInterval::from_secs(60).as_secs(), 60);
        assert_eq!(PingInterval::Never.as_secs(), -1);
    }

    #[test]
    fn test_should_ping() {
        let idle = Duration::from_secs(10);
        assert!(!PingInterval::Never.should_ping(idle));
        assert!(PingInterval::Always.should_ping(Duration::ZERO));
        assert!(PingInterval::from_secs(5).should_ping(idle));
        assert!(!PingInterval::from_secs(10).should_ping(idle));
    }
}
