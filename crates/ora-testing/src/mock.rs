//! Scripted in-memory transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ora_client::{ConnectParams, Connector, DisconnectMode, Error, Result, Session};
use ora_protocol::message::function;
use ora_protocol::{ExecuteFlags, Message, ReadBuffer, ReleaseMode, Request, Response, Value};
use parking_lot::Mutex;

/// One request as seen by a mock session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// TTC function code.
    pub function_code: u8,
    /// Cursor id sent with an execute, `0` otherwise.
    pub cursor_id: u32,
    /// SQL text, present when the statement was parsed.
    pub sql: Option<String>,
    /// Cursor ids closed by piggy-back on this request.
    pub closed_cursors: Vec<u32>,
    /// Mode of a DRCP session release.
    pub release_mode: Option<ReleaseMode>,
}

impl RecordedRequest {
    /// Whether this was an execute of an already parsed cursor.
    #[must_use]
    pub fn is_reexecute(&self) -> bool {
        self.function_code == function::REEXECUTE
            || self.function_code == function::REEXECUTE_AND_FETCH
    }
}

#[derive(Debug, Default)]
struct Script {
    connect_attempts: usize,
    connect_failures: VecDeque<Error>,
    connect_delay: Option<Duration>,
    request_delay: Option<Duration>,
    sessions: Vec<Arc<MockSessionHandle>>,
    server_errors: HashMap<String, (u32, String)>,
    rows: HashMap<String, Vec<Vec<Value>>>,
    warnings: HashMap<String, String>,
    switch_session: bool,
}

/// Connector producing [`MockSession`]s. Clones share the same script.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Arc<Mutex<Script>>,
}

impl MockConnector {
    /// Create a connector whose sessions succeed at everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next connect attempt fail with `error`. Failures queue up.
    pub fn push_connect_failure(&self, error: Error) {
        self.script.lock().connect_failures.push_back(error);
    }

    /// Make the next `count` connect attempts fail with a transport error.
    pub fn fail_next_connects(&self, count: usize) {
        let mut script = self.script.lock();
        for n in 0..count {
            script
                .connect_failures
                .push_back(Error::Transport(format!("listener refused connection #{n}")));
        }
    }

    /// Delay every connect attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.script.lock().connect_delay = Some(delay);
    }

    /// Delay every request before it is processed.
    pub fn set_request_delay(&self, delay: Duration) {
        self.script.lock().request_delay = Some(delay);
    }

    /// Make executions of `sql` fail with a server error.
    pub fn fail_sql(&self, sql: &str, code: u32, message: &str) {
        self.script
            .lock()
            .server_errors
            .insert(sql.to_string(), (code, message.to_string()));
    }

    /// Rows returned by executions of `sql`.
    pub fn set_rows(&self, sql: &str, rows: Vec<Vec<Value>>) {
        self.script.lock().rows.insert(sql.to_string(), rows);
    }

    /// Success-with-info warning returned by executions of `sql`.
    pub fn warn_sql(&self, sql: &str, warning: &str) {
        self.script
            .lock()
            .warnings
            .insert(sql.to_string(), warning.to_string());
    }

    /// Report a server session switch on the next response of any session.
    pub fn switch_session_on_next_response(&self) {
        self.script.lock().switch_session = true;
    }

    /// Number of connect attempts, failed ones included.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.script.lock().connect_attempts
    }

    /// Number of sessions created.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.script.lock().sessions.len()
    }

    /// Handle of the `index`-th created session.
    #[must_use]
    pub fn session(&self, index: usize) -> Option<Arc<MockSessionHandle>> {
        self.script.lock().sessions.get(index).cloned()
    }

    /// Handles of every created session, in creation order.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<MockSessionHandle>> {
        self.script.lock().sessions.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _params: &ConnectParams) -> Result<Box<dyn Session>> {
        let delay = {
            let mut script = self.script.lock();
            script.connect_attempts += 1;
            script.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock();
        if let Some(error) = script.connect_failures.pop_front() {
            tracing::debug!(%error, "mock connect failure");
            return Err(error);
        }
        let handle = Arc::new(MockSessionHandle::new(script.sessions.len()));
        script.sessions.push(Arc::clone(&handle));
        Ok(Box::new(MockSession {
            handle,
            script: Arc::clone(&self.script),
            next_cursor: 1,
            cursors: HashMap::new(),
            txn_in_progress: false,
        }))
    }
}

/// Test-side view of a mock session.
#[derive(Debug)]
pub struct MockSessionHandle {
    index: usize,
    connected: AtomicBool,
    healthy: AtomicBool,
    fail_pings: AtomicBool,
    fail_requests: AtomicBool,
    pings: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
    disconnected: Mutex<Option<DisconnectMode>>,
}

impl MockSessionHandle {
    fn new(index: usize) -> Self {
        Self {
            index,
            connected: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            fail_pings: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
            pings: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            disconnected: Mutex::new(None),
        }
    }

    /// Creation index of this session.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Simulate a dropped transport.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Simulate an unhealthy transport that still looks connected.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make pings fail.
    pub fn fail_pings(&self, fail: bool) {
        self.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// Make every request other than a ping fail with a transport error.
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Number of pings received.
    #[must_use]
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// All requests received.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Function codes of all requests received.
    #[must_use]
    pub fn function_codes(&self) -> Vec<u8> {
        self.requests.lock().iter().map(|r| r.function_code).collect()
    }

    /// Requests that carried `function_code`.
    #[must_use]
    pub fn requests_with(&self, function_code: u8) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.function_code == function_code)
            .cloned()
            .collect()
    }

    /// Every cursor id closed by piggy-back, in order.
    #[must_use]
    pub fn closed_cursors(&self) -> Vec<u32> {
        self.requests
            .lock()
            .iter()
            .flat_map(|r| r.closed_cursors.iter().copied())
            .collect()
    }

    /// How the session was disconnected, if it was.
    #[must_use]
    pub fn disconnect_mode(&self) -> Option<DisconnectMode> {
        *self.disconnected.lock()
    }

    /// Whether the session was disconnected.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.lock().is_some()
    }
}

/// In-memory [`Session`] driven by a [`MockConnector`]'s script.
#[derive(Debug)]
pub struct MockSession {
    handle: Arc<MockSessionHandle>,
    script: Arc<Mutex<Script>>,
    next_cursor: u32,
    /// Open cursors and the SQL they were parsed from.
    cursors: HashMap<u32, String>,
    txn_in_progress: bool,
}

impl MockSession {
    fn decode_piggybacks(bytes: &[u8]) -> Result<Vec<u32>> {
        let mut reader = ReadBuffer::new(bytes);
        let mut closed = Vec::new();
        while reader.remaining() > 0 {
            match reader.read_piggyback_header()? {
                function::CLOSE_CURSORS => closed.extend(reader.read_close_cursors()?),
                other => {
                    return Err(Error::Internal(format!(
                        "unexpected piggy-back function {other}"
                    )));
                }
            }
        }
        Ok(closed)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn process_message(&mut self, message: Message) -> Result<Response> {
        let delay = self.script.lock().request_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.handle.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport("session is not connected".into()));
        }

        let closed_cursors = Self::decode_piggybacks(&message.piggybacks)?;
        for cursor_id in &closed_cursors {
            self.cursors.remove(cursor_id);
        }
        let (cursor_id, sql, release_mode) = match &message.request {
            Request::Execute(req) => (req.cursor_id, req.sql.clone(), None),
            Request::SessionRelease { mode } => (0, None, Some(*mode)),
            _ => (0, None, None),
        };
        self.handle.requests.lock().push(RecordedRequest {
            function_code: message.request.function_code(),
            cursor_id,
            sql,
            closed_cursors,
            release_mode,
        });

        if self.handle.fail_requests.load(Ordering::SeqCst)
            && !matches!(message.request, Request::Ping)
        {
            return Err(Error::Transport("connection reset by peer".into()));
        }

        let mut response = Response::default();
        match message.request {
            Request::Ping => {
                self.handle.pings.fetch_add(1, Ordering::SeqCst);
                if self.handle.fail_pings.load(Ordering::SeqCst) {
                    return Err(Error::Transport("ping timed out".into()));
                }
            }
            Request::Execute(req) => {
                let (cursor_id, sql) = match (req.cursor_id, req.sql) {
                    (0, sql) => {
                        let id = self.next_cursor;
                        self.next_cursor += 1;
                        (id, sql.unwrap_or_default())
                    }
                    (id, Some(sql)) => (id, sql),
                    (id, None) => match self.cursors.get(&id) {
                        Some(sql) => (id, sql.clone()),
                        None => {
                            return Err(Error::Server {
                                code: 1001,
                                message: "invalid cursor".into(),
                                cursor_id: 0,
                            });
                        }
                    },
                };
                self.cursors.insert(cursor_id, sql.clone());

                let script = self.script.lock();
                if let Some((code, message)) = script.server_errors.get(&sql) {
                    return Err(Error::Server {
                        code: *code,
                        message: message.clone(),
                        cursor_id,
                    });
                }
                response.cursor_id = cursor_id;
                response.warning = script.warnings.get(&sql).cloned();
                let lowered = sql.trim_start().to_ascii_lowercase();
                if lowered.starts_with("select") || lowered.starts_with("with") {
                    if let Some(rows) = script.rows.get(&sql) {
                        response.rows = rows.clone();
                        response.num_columns = rows.first().map_or(0, |r| r.len() as u32);
                    }
                } else {
                    response.rows_affected = 1;
                    self.txn_in_progress = !req.flags.contains(ExecuteFlags::COMMIT);
                }
            }
            Request::Commit | Request::Rollback => self.txn_in_progress = false,
            Request::Logoff | Request::SessionRelease { .. } => {}
        }

        response.txn_in_progress = self.txn_in_progress;
        response.session_switched = std::mem::take(&mut self.script.lock().switch_session);
        if response.session_switched {
            // only the cursor parsed by this request exists on the new session
            let current = self.cursors.remove(&response.cursor_id);
            self.cursors.clear();
            if let Some(sql) = current {
                self.cursors.insert(response.cursor_id, sql);
            }
        }
        Ok(response)
    }

    fn is_connected(&self) -> bool {
        self.handle.connected.load(Ordering::SeqCst)
    }

    fn is_healthy(&self) -> bool {
        self.is_connected() && self.handle.healthy.load(Ordering::SeqCst)
    }

    async fn disconnect(&mut self, mode: DisconnectMode) {
        self.handle.connected.store(false, Ordering::SeqCst);
        *self.handle.disconnected.lock() = Some(mode);
    }
}
