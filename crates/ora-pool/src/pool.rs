//! Connection pool implementation.
//!
//! Free connections are kept least recently released first. A single
//! background task creates connections and hands each one to the oldest
//! waiter, or parks it on the free list when nobody waits. An idle timer
//! closes surplus free connections that sat unused for `idle_timeout`.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ora_auth::{AccessToken, CredentialSource, Credentials, TokenProvider};
use ora_client::instrumentation::{DB_SYSTEM, span_names};
use ora_client::{ConnectParams, Connection, Connector};
use parking_lot::Mutex;
use rand::RngCore;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::{PingInterval, PoolConfig};
use crate::error::{PoolError, Result};
use crate::lifecycle::{self, ConnectionMetadata, HealthCheckResult, SessionInit};

type Waiter = oneshot::Sender<Result<PooledConnection>>;

/// A connection pool for Oracle Database.
///
/// The pool keeps between `min_connections` and `max_connections` sessions
/// open. Acquiring hands out the most recently released free connection
/// that passes its health check; when none is free the caller queues and
/// the background grower opens more.
///
/// # Example
///
/// ```rust,ignore
/// use ora_driver_pool::{Pool, PoolConfig};
///
/// let pool = Pool::builder()
///     .connector(connector)
///     .connect_params(params)
///     .pool_config(PoolConfig::new().min_connections(2).max_connections(8))
///     .build()
///     .await?;
///
/// let conn = pool.acquire().await?;
/// conn.execute("select sysdate from dual").await?;
/// conn.release();
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    credentials: CredentialSource,
    /// Template for new connections; credentials are filled in per creation.
    params: ConnectParams,
    drcp: bool,
    session_init: Option<Arc<dyn SessionInit>>,
    state: Mutex<PoolState>,
    grow: Arc<Notify>,
    /// Signalled whenever a connection leaves `used`.
    drained: Notify,
    grower: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    created_at: Instant,
    metrics: Mutex<PoolMetricsInner>,
}

struct IdleConnection {
    conn: Connection,
    metadata: ConnectionMetadata,
}

#[derive(Default)]
struct PoolState {
    /// Back is the most recently released.
    free: VecDeque<IdleConnection>,
    used: HashMap<u64, Connection>,
    /// Taken off the free list and being health checked.
    checking: usize,
    waiters: VecDeque<Waiter>,
    /// Creation failure nobody was waiting for.
    pending_error: Option<PoolError>,
    idle_timer: Option<JoinHandle<()>>,
    closing: bool,
}

impl PoolState {
    fn total(&self) -> usize {
        self.free.len() + self.used.len() + self.checking
    }
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    connections_created: u64,
    connections_closed: u64,
    creation_failures: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    health_checks_performed: u64,
    health_checks_failed: u64,
    idle_evictions: u64,
}

enum Next {
    Candidate(Candidate),
    Wait(oneshot::Receiver<Result<PooledConnection>>),
}

/// A free connection under health check. Dropped unchecked, it is
/// destroyed.
struct Candidate {
    pool: Arc<PoolInner>,
    idle: Option<IdleConnection>,
}

impl Candidate {
    fn connection(&self) -> Option<&Connection> {
        self.idle.as_ref().map(|idle| &idle.conn)
    }

    fn check_out(mut self) -> Result<PooledConnection> {
        let pool = Arc::clone(&self.pool);
        let mut state = pool.state.lock();
        state.checking -= 1;
        let Some(idle) = self.idle.take() else {
            return Err(PoolError::PoolClosed);
        };
        if state.closing {
            drop(state);
            pool.destroy(idle.conn);
            return Err(PoolError::PoolClosed);
        }
        Ok(pool.check_out(&mut state, idle))
    }
}

impl Drop for Candidate {
    fn drop(&mut self) {
        if let Some(idle) = self.idle.take() {
            self.pool.state.lock().checking -= 1;
            self.pool.destroy(idle.conn);
            self.pool.slot_freed();
        }
    }
}

impl Pool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a pool opening connections through `connector`.
    ///
    /// Returns once the grower is started; the first `min_connections`
    /// sessions are opened in the background.
    pub async fn new(
        connector: impl Connector + 'static,
        params: ConnectParams,
        config: PoolConfig,
    ) -> Result<Self> {
        Self::create(Arc::new(connector), params, config, None, None)
    }

    fn create(
        connector: Arc<dyn Connector>,
        params: ConnectParams,
        config: PoolConfig,
        token_provider: Option<Arc<dyn TokenProvider>>,
        session_init: Option<Arc<dyn SessionInit>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut credentials = CredentialSource::new(params.credentials.clone());
        if let Some(provider) = token_provider {
            credentials = credentials.with_provider(provider);
        }
        credentials.validate()?;

        let drcp = params.descriptor()?.is_drcp();
        let connection_class = match (&config.connection_class, drcp) {
            (Some(class), _) => Some(class.clone()),
            (None, true) => Some(generate_connection_class()),
            (None, false) => params.connection_class.clone(),
        };

        let mut params = params
            .pooled(true)
            .stmt_cache_size(config.stmt_cache_size)
            .error_on_concurrent_execute(config.error_on_concurrent_execute);
        params.connection_class = connection_class;
        params.credentials = Credentials::default();

        let grow = Arc::new(Notify::new());
        let inner = Arc::new(PoolInner {
            config: config.clone(),
            connector,
            credentials,
            params,
            drcp,
            session_init,
            state: Mutex::new(PoolState::default()),
            grow: Arc::clone(&grow),
            drained: Notify::new(),
            grower: Mutex::new(None),
            closed: AtomicBool::new(false),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
        });

        let grower = tokio::spawn(grow_pool(Arc::downgrade(&inner), grow));
        *inner.grower.lock() = Some(grower);

        tracing::info!(
            pool_min = config.min_connections,
            pool_max = config.max_connections,
            pool_increment = config.increment,
            drcp,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Get a connection from the pool.
    ///
    /// Free connections are tried most recently released first. One that
    /// fails its liveness check or required ping is closed and the next is
    /// tried; such failures never reach the caller. With no free
    /// connection left the caller waits for the grower or for a release,
    /// and the connection it is handed goes through the same check.
    ///
    /// A session seen for the first time is passed to the pool's
    /// [`SessionInit`] hook, if any. When the hook fails the connection is
    /// closed and its error returned.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let span = tracing::debug_span!(span_names::POOL_ACQUIRE, db.system = DB_SYSTEM);
        let result = self.acquire_inner().instrument(span).await;
        let mut metrics = self.inner.metrics.lock();
        if result.is_ok() {
            metrics.checkouts_successful += 1;
        } else {
            metrics.checkouts_failed += 1;
        }
        result
    }

    /// Alias of [`acquire`](Self::acquire).
    pub async fn get_connection(&self) -> Result<PooledConnection> {
        self.acquire().await
    }

    async fn acquire_inner(&self) -> Result<PooledConnection> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::PoolClosed);
        }

        loop {
            let conn = match self.inner.next_candidate()? {
                Next::Candidate(candidate) => {
                    let Some(conn) = candidate.connection() else {
                        continue;
                    };
                    let check = self.health_check(conn).await;
                    if !check.is_usable() {
                        tracing::debug!(connection_id = conn.id(), result = ?check, "dropping unusable pooled connection");
                        drop(candidate);
                        continue;
                    }
                    candidate.check_out()?
                }
                Next::Wait(rx) => {
                    let conn = self.wait_for(rx).await?;
                    let check = self.health_check(&conn).await;
                    if !check.is_usable() {
                        tracing::debug!(connection_id = conn.id(), result = ?check, "dropping unusable handed-over connection");
                        conn.discard();
                        continue;
                    }
                    conn
                }
            };
            return self.init_session(conn).await;
        }
    }

    async fn health_check(&self, conn: &Connection) -> HealthCheckResult {
        let check = lifecycle::check_connection(conn, self.inner.config.ping_interval).await;
        if check.pinged() {
            let mut metrics = self.inner.metrics.lock();
            metrics.health_checks_performed += 1;
            if !check.is_usable() {
                metrics.health_checks_failed += 1;
            }
        }
        check
    }

    async fn init_session(&self, conn: PooledConnection) -> Result<PooledConnection> {
        let Some(hook) = &self.inner.session_init else {
            return Ok(conn);
        };
        if !conn.is_new_session() {
            return Ok(conn);
        }
        match hook.init_session(&conn).await {
            Ok(()) => Ok(conn),
            Err(e) => {
                tracing::warn!(connection_id = conn.id(), error = %e, "session init failed, dropping connection");
                conn.discard();
                Err(e.into())
            }
        }
    }

    async fn wait_for(
        &self,
        rx: oneshot::Receiver<Result<PooledConnection>>,
    ) -> Result<PooledConnection> {
        tracing::trace!("waiting for a pooled connection");
        let received = match self.inner.config.acquire_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::debug!(timeout = ?limit, "timed out waiting for a pooled connection");
                    return Err(PoolError::AcquireTimeout(limit));
                }
            },
            None => rx.await,
        };

        match received {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(error)) => {
                if self.inner.has_waiters() {
                    self.inner.grow.notify_one();
                }
                Err(error)
            }
            Err(_) => Err(PoolError::PoolClosed),
        }
    }

    /// Give a connection back to the pool.
    pub fn release(&self, conn: PooledConnection) {
        conn.release();
    }

    /// Replace the access token used for new connections.
    pub fn set_access_token(&self, token: AccessToken) {
        self.inner.credentials.set_access_token(token);
    }

    /// Number of open connections, free and in use.
    #[must_use]
    pub fn connections_open(&self) -> usize {
        self.inner.state.lock().total()
    }

    /// Number of connections checked out.
    #[must_use]
    pub fn connections_in_use(&self) -> usize {
        self.inner.state.lock().used.len()
    }

    /// Minimum number of connections.
    #[must_use]
    pub fn pool_min(&self) -> u32 {
        self.inner.config.min_connections
    }

    /// Maximum number of connections.
    #[must_use]
    pub fn pool_max(&self) -> u32 {
        self.inner.config.max_connections
    }

    /// Growth increment.
    #[must_use]
    pub fn pool_increment(&self) -> u32 {
        self.inner.config.increment
    }

    /// Idle timeout, zero when eviction is disabled.
    #[must_use]
    pub fn pool_timeout(&self) -> Duration {
        self.inner.config.idle_timeout
    }

    /// Ping policy.
    #[must_use]
    pub fn pool_ping_interval(&self) -> PingInterval {
        self.inner.config.ping_interval
    }

    /// Statement cache size of each connection.
    #[must_use]
    pub fn stmt_cache_size(&self) -> usize {
        self.inner.config.stmt_cache_size
    }

    /// DRCP connection class applied to new sessions.
    #[must_use]
    pub fn connection_class(&self) -> Option<&str> {
        self.inner.params.connection_class.as_deref()
    }

    /// Whether the pool connects to DRCP pooled servers.
    #[must_use]
    pub fn is_drcp(&self) -> bool {
        self.inner.drcp
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.free.len() as u32,
            in_use: state.used.len() as u32,
            total: state.total() as u32,
            max: self.inner.config.max_connections,
            waiters: state.waiters.len() as u32,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            creation_failures: inner.creation_failures,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            health_checks_performed: inner.health_checks_performed,
            health_checks_failed: inner.health_checks_failed,
            idle_evictions: inner.idle_evictions,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool.
    ///
    /// Stops the grower and the idle timer, fails queued waiters with
    /// [`PoolError::PoolClosed`] and closes every connection, including
    /// those still checked out. Errors while closing connections are
    /// logged, not returned.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown().await;
    }

    /// Close the pool after giving checked-out connections up to `drain`
    /// to come back.
    ///
    /// New acquires fail with [`PoolError::PoolClosed`] at once and queued
    /// waiters are failed. Connections still out when `drain` expires are
    /// closed as by [`close`](Self::close).
    pub async fn close_with_drain(&self, drain: Duration) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let waiters = std::mem::take(&mut self.inner.state.lock().waiters);
        drop(waiters);

        tracing::info!(drain_time = ?drain, "draining connection pool");
        if tokio::time::timeout(drain, self.inner.wait_drained()).await.is_err() {
            tracing::warn!(
                busy = self.connections_in_use(),
                "drain time expired, closing busy connections"
            );
        }
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        let (free, used, waiters, timer) = {
            let mut state = self.inner.state.lock();
            state.closing = true;
            (
                std::mem::take(&mut state.free),
                state.used.values().cloned().collect::<Vec<_>>(),
                std::mem::take(&mut state.waiters),
                state.idle_timer.take(),
            )
        };
        drop(waiters);
        if let Some(timer) = timer {
            timer.abort();
        }

        self.inner.grow.notify_one();
        let grower = self.inner.grower.lock().take();
        if let Some(grower) = grower {
            if let Err(e) = grower.await {
                tracing::warn!(error = %e, "pool grower ended abnormally");
            }
        }

        for idle in free {
            self.inner.close_now(idle.conn).await;
        }
        for conn in used {
            self.inner.close_now(conn).await;
        }

        tracing::info!("connection pool closed");
    }

    /// Close the pool unless connections are checked out.
    pub async fn try_close(&self) -> Result<()> {
        let busy = self.inner.state.lock().used.len();
        if busy > 0 {
            return Err(PoolError::BusyConnections(busy));
        }
        self.close().await;
        Ok(())
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .field("drcp", &self.inner.drcp)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PoolInner {
    fn is_closing(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn has_waiters(&self) -> bool {
        !self.state.lock().waiters.is_empty()
    }

    /// Call after a connection left the pool's accounting or went back to
    /// it. Wakes the grower when callers wait or the pool is below its
    /// minimum, and wakes a draining close once nothing is checked out.
    fn slot_freed(&self) {
        let (needs_growth, drained) = {
            let state = self.state.lock();
            (
                !state.waiters.is_empty()
                    || state.total() < self.config.min_connections as usize,
                state.used.is_empty(),
            )
        };
        if needs_growth {
            self.grow.notify_one();
        }
        if drained {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let drained = self.state.lock().used.is_empty();
            if drained {
                return;
            }
            notified.await;
        }
    }

    /// Pop the most recently released free connection, or queue a waiter
    /// when there is none.
    fn next_candidate(self: &Arc<Self>) -> Result<Next> {
        let mut state = self.state.lock();
        if state.closing || self.is_closing() {
            return Err(PoolError::PoolClosed);
        }
        if let Some(idle) = state.free.pop_back() {
            state.checking += 1;
            return Ok(Next::Candidate(Candidate {
                pool: Arc::clone(self),
                idle: Some(idle),
            }));
        }
        if let Some(error) = state.pending_error.take() {
            return Err(error);
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        drop(state);
        self.grow.notify_one();
        Ok(Next::Wait(rx))
    }

    fn check_out(self: &Arc<Self>, state: &mut PoolState, idle: IdleConnection) -> PooledConnection {
        let IdleConnection { conn, mut metadata } = idle;
        metadata.record_checkout();
        state.used.insert(conn.id(), conn.clone());
        PooledConnection {
            conn,
            metadata,
            pool: Some(Arc::clone(self)),
        }
    }

    /// Hand `idle` to the oldest waiter still listening. Returns it when
    /// nobody takes it.
    fn hand_to_waiter(
        self: &Arc<Self>,
        state: &mut PoolState,
        mut idle: IdleConnection,
    ) -> Option<IdleConnection> {
        while let Some(waiter) = state.waiters.pop_front() {
            let pooled = self.check_out(state, idle);
            let connection_id = pooled.id();
            match waiter.send(Ok(pooled)) {
                Ok(()) => {
                    tracing::trace!(connection_id, "connection handed to waiter");
                    return None;
                }
                Err(returned) => {
                    state.used.remove(&connection_id);
                    idle = returned.ok()?.into_idle()?;
                }
            }
        }
        Some(idle)
    }

    /// Place a newly created connection.
    fn deliver(self: &Arc<Self>, idle: IdleConnection) {
        let mut state = self.state.lock();
        if state.closing {
            drop(state);
            self.destroy(idle.conn);
            return;
        }
        state.pending_error = None;
        if let Some(idle) = self.hand_to_waiter(&mut state, idle) {
            state.free.push_back(idle);
            self.arm_idle_timer(&mut state);
        }
    }

    /// Give a creation failure to the oldest waiter, or keep it for the
    /// next caller that would have to wait. Returns whether a waiter got it.
    fn deliver_error(&self, error: PoolError) -> bool {
        self.metrics.lock().creation_failures += 1;
        tracing::warn!(error = %error, "background connection creation failed");

        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(Err(error.clone())).is_ok() {
                return true;
            }
        }
        state.pending_error = Some(error);
        false
    }

    fn release(self: &Arc<Self>, conn: Connection, metadata: ConnectionMetadata) {
        let mut state = self.state.lock();
        state.used.remove(&conn.id());
        if state.closing {
            drop(state);
            // already closed by `Pool::close` unless it raced with the release
            if conn.is_connected() {
                self.destroy(conn);
            }
            return;
        }

        let mut disconnected = None;
        if conn.is_connected() {
            conn.mark_released();
            let idle = IdleConnection { conn, metadata };
            if let Some(idle) = self.hand_to_waiter(&mut state, idle) {
                state.free.push_back(idle);
            }
        } else {
            conn.clear_warning();
            tracing::debug!(connection_id = conn.id(), "released connection is disconnected");
            disconnected = Some(conn);
        }

        self.arm_idle_timer(&mut state);
        drop(state);

        if let Some(conn) = disconnected {
            self.destroy(conn);
        }
        self.slot_freed();
    }

    fn detach(&self, connection_id: u64) {
        self.state.lock().used.remove(&connection_id);
        tracing::debug!(connection_id, "connection detached from pool");
        self.slot_freed();
    }

    /// Drop a checked-out connection that must not be reused.
    fn discard(&self, conn: Connection) {
        self.state.lock().used.remove(&conn.id());
        self.destroy(conn);
        self.slot_freed();
    }

    /// Connections the grower should open now.
    fn connections_to_create(&self) -> usize {
        let mut state = self.state.lock();
        if state.closing {
            return 0;
        }
        state.waiters.retain(|waiter| !waiter.is_closed());

        let total = state.total();
        let min = self.config.min_connections as usize;
        let max = self.config.max_connections as usize;
        if total < min {
            min - total
        } else if !state.waiters.is_empty() {
            (self.config.increment as usize).min(max.saturating_sub(total))
        } else {
            0
        }
    }

    async fn create_connection(&self) -> Result<IdleConnection> {
        let credentials = self.credentials.current().await?;
        let mut params = self.params.clone();
        params.credentials = credentials;

        let conn = Connection::connect(self.connector.as_ref(), &params).await?;
        self.metrics.lock().connections_created += 1;
        tracing::debug!(connection_id = conn.id(), "pool connection created");
        Ok(IdleConnection {
            metadata: ConnectionMetadata::new(conn.id()),
            conn,
        })
    }

    /// Create up to `count` connections one after another. Returns `false`
    /// if a creation failed with nobody waiting for it.
    async fn grow_by(self: &Arc<Self>, count: usize) -> bool {
        for _ in 0..count {
            if self.is_closing() {
                return true;
            }
            let created = self.create_connection().await;
            let delivered = match created {
                Ok(idle) => {
                    self.deliver(idle);
                    true
                }
                Err(error) => self.deliver_error(error),
            };
            tokio::task::yield_now().await;
            if !delivered {
                return false;
            }
        }
        true
    }

    fn arm_idle_timer(self: &Arc<Self>, state: &mut PoolState) {
        if state.idle_timer.is_some()
            || state.closing
            || self.config.idle_timeout.is_zero()
            || state.free.is_empty()
            || state.total() <= self.config.min_connections as usize
        {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            return;
        };

        let pool = Arc::downgrade(self);
        let timeout = self.config.idle_timeout;
        state.idle_timer = Some(handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(pool) = pool.upgrade() {
                pool.evict_idle();
            }
        }));
    }

    /// Close free connections idle for at least `idle_timeout`, oldest
    /// first, without going below `min_connections`.
    fn evict_idle(self: &Arc<Self>) {
        let mut evicted = Vec::new();
        {
            let mut state = self.state.lock();
            state.idle_timer = None;
            let min = self.config.min_connections as usize;
            while state.total() > min {
                let expired = state
                    .free
                    .front()
                    .is_some_and(|idle| idle.conn.idle_time() >= self.config.idle_timeout);
                if !expired {
                    break;
                }
                if let Some(idle) = state.free.pop_front() {
                    evicted.push(idle.conn);
                }
            }
            self.arm_idle_timer(&mut state);
        }

        if !evicted.is_empty() {
            self.metrics.lock().idle_evictions += evicted.len() as u64;
            tracing::debug!(count = evicted.len(), "evicting idle connections");
        }
        for conn in evicted {
            self.destroy(conn);
        }
    }

    /// Close `conn` in the background.
    fn destroy(&self, conn: Connection) {
        self.metrics.lock().connections_closed += 1;
        let connection_id = conn.id();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        tracing::warn!(connection_id, error = %e, "failed to close pooled connection");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(connection_id, "no runtime, dropping pooled connection without logoff");
            }
        }
    }

    async fn close_now(&self, conn: Connection) {
        self.metrics.lock().connections_closed += 1;
        if let Err(e) = conn.close().await {
            tracing::warn!(connection_id = conn.id(), error = %e, "failed to close pooled connection");
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.grow.notify_one();
        if let Some(timer) = self.state.get_mut().idle_timer.take() {
            timer.abort();
        }
    }
}

/// Background grower. Holds the pool only while working so that dropping
/// every handle ends it.
async fn grow_pool(pool: Weak<PoolInner>, wake: Arc<Notify>) {
    loop {
        let Some(inner) = pool.upgrade() else {
            break;
        };
        if inner.is_closing() {
            break;
        }

        let count = inner.connections_to_create();
        if count == 0 {
            drop(inner);
            wake.notified().await;
            continue;
        }

        tracing::debug!(count, "growing pool");
        if !inner.grow_by(count).await {
            let delay = inner.config.creation_retry_delay;
            drop(inner);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = wake.notified() => {}
            }
        }
    }
    tracing::trace!("pool grower stopped");
}

/// `ORA:` plus 16 random bytes in base64, so generated classes are easy to
/// spot in `V$CPOOL_CC_STATS`.
fn generate_connection_class() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("ORA:{}", STANDARD.encode(bytes))
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .connector(connector)
///     .connect_params(params)
///     .min_connections(4)
///     .max_connections(10)
///     .build()
///     .await?;
/// ```
pub struct PoolBuilder {
    connector: Option<Arc<dyn Connector>>,
    params: ConnectParams,
    token_provider: Option<Arc<dyn TokenProvider>>,
    session_init: Option<Arc<dyn SessionInit>>,
    pool_config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            connector: None,
            params: ConnectParams::default(),
            token_provider: None,
            session_init: None,
            pool_config: PoolConfig::default(),
        }
    }

    /// Set the transport used to open sessions.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set the parameters each connection is opened with.
    #[must_use]
    pub fn connect_params(mut self, params: ConnectParams) -> Self {
        self.params = params;
        self
    }

    /// Refresh expired access tokens through `provider`.
    #[must_use]
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Run `hook` on each session the first time it is handed out.
    #[must_use]
    pub fn session_init(mut self, hook: Arc<dyn SessionInit>) -> Self {
        self.session_init = Some(hook);
        self
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.pool_config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = count;
        self
    }

    /// Set the growth increment.
    #[must_use]
    pub fn increment(mut self, count: u32) -> Self {
        self.pool_config.increment = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = timeout;
        self
    }

    /// Set the ping policy.
    #[must_use]
    pub fn ping_interval(mut self, interval: PingInterval) -> Self {
        self.pool_config.ping_interval = interval;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.acquire_timeout = Some(timeout);
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool> {
        let connector = self
            .connector
            .ok_or_else(|| PoolError::Config("a connector is required".into()))?;
        Pool::create(
            connector,
            self.params,
            self.pool_config,
            self.token_provider,
            self.session_init,
        )
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
    /// Callers queued for a connection.
    pub waiters: u32,
}

impl PoolStatus {
    /// Calculate pool utilization as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max && self.available == 0
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Background creations that failed.
    pub creation_failures: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed, creation errors).
    pub checkouts_failed: u64,
    /// Pings performed on acquire.
    pub health_checks_performed: u64,
    /// Pings that failed.
    pub health_checks_failed: u64,
    /// Connections closed by the idle timer.
    pub idle_evictions: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate health check success rate (0.0 to 1.0).
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let successful = self.health_checks_performed - self.health_checks_failed;
        successful as f64 / self.health_checks_performed as f64
    }
}

/// A connection retrieved from the pool.
///
/// Dereferences to [`Connection`]. Give it back with
/// [`release()`](PooledConnection::release); dropping it has the same
/// effect. Use [`detach()`](PooledConnection::detach) to take it out of the
/// pool for good.
pub struct PooledConnection {
    conn: Connection,
    metadata: ConnectionMetadata,
    /// `None` once released or detached.
    pool: Option<Arc<PoolInner>>,
}

impl PooledConnection {
    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    /// Return the connection to the pool.
    pub fn release(mut self) {
        self.return_to_pool();
    }

    /// Release the DRCP session to the server, then return the connection
    /// to the pool. The connection is returned even if the release fails.
    pub async fn close(mut self) -> Result<()> {
        let released = self.conn.release_session().await;
        self.return_to_pool();
        released.map_err(PoolError::from)
    }

    /// Detach the connection from the pool.
    ///
    /// The pool forgets it and may open a replacement; closing it is up to
    /// the caller.
    #[must_use]
    pub fn detach(mut self) -> Connection {
        if let Some(pool) = self.pool.take() {
            pool.detach(self.conn.id());
        }
        self.conn.clone()
    }

    fn discard(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.discard(self.conn.clone());
        }
    }

    fn return_to_pool(&mut self) {
        if let Some(pool) = self.pool.take() {
            tracing::trace!(connection_id = self.metadata.id, "returning connection to pool");
            pool.release(self.conn.clone(), self.metadata.clone());
        }
    }

    fn into_idle(mut self) -> Option<IdleConnection> {
        self.pool.take()?;
        Some(IdleConnection {
            conn: self.conn.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.conn)
            .field("metadata", &self.metadata)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.return_to_pool();
    }
}
