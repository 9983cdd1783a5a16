//! A single database connection.
//!
//! A [`Connection`] owns one server session, its statement cache and the
//! operation lock serializing their use. Handles are cheap to clone; all
//! clones share the same session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ora_protocol::{Message, ReleaseMode, Request, Response, WriteBuffer};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::Instrument;

use crate::cache::StatementCache;
use crate::config::{ConnectParams, Purity};
use crate::error::{Error, Result};
use crate::instrumentation::{self, SanitizationConfig, span_names};
use crate::lock::OperationLock;
use crate::query::{Query, QueryResult};
use crate::statement::StatementId;
use crate::transport::{Connector, DisconnectMode, Session};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Everything guarded by the operation lock.
#[derive(Debug)]
struct SessionState {
    session: Box<dyn Session>,
    cache: StatementCache,
    txn_in_progress: bool,
    /// Set after a DRCP session release: the next round trip may land on a
    /// different server session.
    drcp_establish_session: bool,
    closed: bool,
}

#[derive(Debug)]
struct Usage {
    last_time_used: Instant,
    new_session: bool,
    warning: Option<String>,
}

#[derive(Debug)]
struct ConnectionInner {
    id: u64,
    state: OperationLock<SessionState>,
    usage: Mutex<Usage>,
    stmt_cache_size: usize,
    prefetch_rows: u32,
    drcp: bool,
    pooled: bool,
    connection_class: Option<String>,
    purity: Purity,
    sanitization: SanitizationConfig,
}

/// Handle to an open connection.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Validate `params`, open a session through `connector` and set up
    /// the statement cache.
    pub async fn connect(connector: &dyn Connector, params: &ConnectParams) -> Result<Self> {
        params.validate()?;
        let drcp = params.descriptor()?.is_drcp();
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);

        let session = connector
            .connect(params)
            .instrument(instrumentation::call_span(span_names::CONNECT, id))
            .await?;

        tracing::debug!(
            connection_id = id,
            drcp,
            pooled = params.pooled,
            stmt_cache_size = params.stmt_cache_size,
            "connection established"
        );

        let state = SessionState {
            session,
            cache: StatementCache::new(params.stmt_cache_size),
            txn_in_progress: false,
            drcp_establish_session: false,
            closed: false,
        };

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                id,
                state: OperationLock::new(state, params.error_on_concurrent_execute),
                usage: Mutex::new(Usage {
                    last_time_used: Instant::now(),
                    new_session: true,
                    warning: None,
                }),
                stmt_cache_size: params.stmt_cache_size,
                prefetch_rows: params.prefetch_rows,
                drcp,
                pooled: params.pooled,
                connection_class: params.connection_class.clone(),
                purity: params.effective_purity(),
                sanitization: params.sanitization.clone(),
            }),
        })
    }

    /// Client side connection id, unique within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Statement cache capacity.
    #[must_use]
    pub fn stmt_cache_size(&self) -> usize {
        self.inner.stmt_cache_size
    }

    /// Whether the session runs on a DRCP pooled server.
    #[must_use]
    pub fn is_drcp(&self) -> bool {
        self.inner.drcp
    }

    /// Whether the connection is owned by a pool.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.inner.pooled
    }

    /// DRCP connection class.
    #[must_use]
    pub fn connection_class(&self) -> Option<&str> {
        self.inner.connection_class.as_deref()
    }

    /// DRCP session purity requested for this connection.
    #[must_use]
    pub fn purity(&self) -> Purity {
        self.inner.purity
    }

    /// When the connection was last handed back to its owner.
    #[must_use]
    pub fn last_time_used(&self) -> Instant {
        self.inner.usage.lock().last_time_used
    }

    /// Time since [`last_time_used`](Self::last_time_used).
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_time_used().elapsed()
    }

    /// Whether the session has not been handed out and returned yet.
    #[must_use]
    pub fn is_new_session(&self) -> bool {
        self.inner.usage.lock().new_session
    }

    /// Warning reported by the last round trip, until the connection is
    /// released.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        self.inner.usage.lock().warning.clone()
    }

    /// Clear per-use state and stamp the release time. Called by the owner
    /// (usually a pool) when the connection is handed back.
    pub fn mark_released(&self) {
        let mut usage = self.inner.usage.lock();
        usage.last_time_used = Instant::now();
        usage.new_session = false;
        usage.warning = None;
    }

    /// Clear the pending warning only.
    pub fn clear_warning(&self) {
        self.inner.usage.lock().warning = None;
    }

    /// Non-network health check. A connection busy with an operation is
    /// reported healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.inner
            .state
            .try_with(|s| !s.closed && s.session.is_healthy())
            .unwrap_or(true)
    }

    /// Whether the transport is still connected. A connection busy with an
    /// operation is reported connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .try_with(|s| !s.closed && s.session.is_connected())
            .unwrap_or(true)
    }

    /// Whether a transaction is open, or `None` while an operation runs.
    #[must_use]
    pub fn in_transaction(&self) -> Option<bool> {
        self.inner.state.try_with(|s| s.txn_in_progress)
    }

    /// Inspect the statement cache, or `None` while an operation runs.
    pub fn with_statement_cache<R>(&self, f: impl FnOnce(&StatementCache) -> R) -> Option<R> {
        self.inner.state.try_with(|s| f(&s.cache))
    }

    /// Number of operations queued on this connection.
    #[must_use]
    pub fn waiting_operations(&self) -> usize {
        self.inner.state.waiting()
    }

    /// Execute a statement.
    pub async fn execute(&self, query: impl Into<Query>) -> Result<QueryResult> {
        let query = query.into();
        let span = instrumentation::execute_span(self.id(), query.sql(), &self.inner.sanitization);
        async {
            let mut state = self.inner.state.acquire().await?;
            if state.closed {
                return Err(Error::ConnectionClosed);
            }

            let cacheable = query.cacheable() && !state.drcp_establish_session;
            let stmt_id = state.cache.get_statement(query.sql(), cacheable)?;
            let outcome = self.run_statement(&mut state, stmt_id, &query).await;
            let returned = state.cache.return_statement(stmt_id);
            let result = outcome?;
            returned?;
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn run_statement(
        &self,
        state: &mut SessionState,
        stmt_id: StatementId,
        query: &Query,
    ) -> Result<QueryResult> {
        let prefetch_rows = query.prefetch_override().unwrap_or(self.inner.prefetch_rows);
        let request = {
            let stmt = state
                .cache
                .statement_mut(stmt_id)
                .ok_or_else(|| Error::Internal("statement left the cache while in use".into()))?;
            query.apply_binds(stmt)?;
            stmt.execute_request(prefetch_rows, query.is_auto_commit())
        };

        let response = match self.round_trip(state, Request::Execute(request)).await {
            Ok(response) => response,
            Err(err) => {
                if let Error::Server { cursor_id, .. } = &err {
                    if *cursor_id != 0 {
                        if let Some(stmt) = state.cache.statement_mut(stmt_id) {
                            stmt.cursor_id = *cursor_id;
                        }
                        state.cache.discard(stmt_id);
                    }
                }
                return Err(err);
            }
        };

        if let Some(stmt) = state.cache.statement_mut(stmt_id) {
            if response.cursor_id != 0 {
                stmt.cursor_id = response.cursor_id;
            }
            stmt.requires_full_execute = false;
            stmt.num_columns = response.num_columns;
            instrumentation::record_execute(
                &tracing::Span::current(),
                stmt.cursor_id,
                response.rows_affected,
            );
            tracing::trace!(
                connection_id = self.id(),
                cursor_id = stmt.cursor_id,
                "statement executed"
            );
        }

        Ok(QueryResult {
            rows: response.rows,
            rows_affected: response.rows_affected,
            out_values: response.out_values,
            warning: response.warning,
        })
    }

    /// Send `request` with any pending cursor closes and apply the session
    /// state carried by the response.
    async fn round_trip(&self, state: &mut SessionState, request: Request) -> Result<Response> {
        if state.closed {
            return Err(Error::ConnectionClosed);
        }

        let mut message = Message::new(request);
        if !state.drcp_establish_session && !state.cache.cursors_to_close().is_empty() {
            let mut buf = WriteBuffer::new();
            buf.write_close_cursors_header();
            state.cache.write_cursors_to_close(&mut buf);
            message = message.with_piggybacks(buf.freeze());
        }

        let response = state.session.process_message(message).await?;

        state.txn_in_progress = response.txn_in_progress;
        if response.session_switched {
            tracing::debug!(connection_id = self.id(), "server session changed, resetting cursors");
            state.cache.clear_open_cursors();
        }
        state.drcp_establish_session = false;
        if let Some(warning) = &response.warning {
            self.inner.usage.lock().warning = Some(warning.clone());
        }
        Ok(response)
    }

    async fn call(&self, name: &'static str, request: Request) -> Result<Response> {
        async {
            let mut state = self.inner.state.acquire().await?;
            self.round_trip(&mut state, request).await
        }
        .instrument(instrumentation::call_span(name, self.id()))
        .await
    }

    /// Round-trip ping.
    pub async fn ping(&self) -> Result<()> {
        self.call(span_names::PING, Request::Ping).await.map(|_| ())
    }

    /// Commit the current transaction.
    pub async fn commit(&self) -> Result<()> {
        self.call(span_names::COMMIT, Request::Commit).await.map(|_| ())
    }

    /// Roll back the current transaction.
    pub async fn rollback(&self) -> Result<()> {
        self.call(span_names::ROLLBACK, Request::Rollback).await.map(|_| ())
    }

    /// Give the DRCP session back to the server-side pool, keeping the
    /// transport open. An open transaction is rolled back first. Does
    /// nothing for non-DRCP connections.
    pub async fn release_session(&self) -> Result<()> {
        if !self.inner.drcp {
            return Ok(());
        }
        async {
            let mut state = self.inner.state.acquire().await?;
            self.release_session_locked(&mut state).await
        }
        .instrument(instrumentation::call_span(span_names::CLOSE, self.id()))
        .await
    }

    async fn release_session_locked(&self, state: &mut SessionState) -> Result<()> {
        if state.txn_in_progress {
            self.round_trip(state, Request::Rollback).await?;
        }
        let mode = if self.inner.pooled {
            ReleaseMode::Normal
        } else {
            ReleaseMode::Deauthenticate
        };
        self.round_trip(state, Request::SessionRelease { mode }).await?;
        state.drcp_establish_session = true;
        Ok(())
    }

    /// Terminate the connection.
    ///
    /// Rolls back an open transaction, then releases the DRCP session or
    /// logs off, and finally disconnects. The transport is closed even when
    /// those round trips fail; the first failure is returned. Closing a
    /// closed connection does nothing.
    pub async fn close(&self) -> Result<()> {
        async {
            let mut state = self.inner.state.acquire().await?;
            if state.closed {
                return Ok(());
            }

            let result = if !state.session.is_connected() {
                Ok(())
            } else if self.inner.drcp {
                self.release_session_locked(&mut state).await
            } else {
                let rolled_back = if state.txn_in_progress {
                    self.round_trip(&mut state, Request::Rollback).await.map(|_| ())
                } else {
                    Ok(())
                };
                match rolled_back {
                    Ok(()) => self.round_trip(&mut state, Request::Logoff).await.map(|_| ()),
                    Err(e) => Err(e),
                }
            };

            let mode = if result.is_ok() {
                DisconnectMode::Graceful
            } else {
                DisconnectMode::Abort
            };
            state.session.disconnect(mode).await;
            state.closed = true;
            tracing::debug!(connection_id = self.id(), "connection closed");
            result
        }
        .instrument(instrumentation::call_span(span_names::CLOSE, self.id()))
        .await
    }
}
