//! Connection integration tests against the scripted mock transport.
//!
//! These exercise the statement cache, cursor bookkeeping and session
//! lifecycle as seen on the wire.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use ora_client::{Connection, DisconnectMode, Error, Query, Value};
use ora_protocol::ReleaseMode;
use ora_protocol::message::function;
use ora_testing::{MockConnector, drcp_params, test_params};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// =============================================================================
// Statement cache over the wire
// =============================================================================

#[tokio::test]
async fn test_cached_statement_is_reexecuted() {
    init_tracing();
    let connector = MockConnector::new();
    connector.set_rows("select 1 from dual", vec![vec![Value::from(1)]]);
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();

    let first = conn.execute("select 1 from dual").await.unwrap();
    let second = conn.execute("select 1 from dual").await.unwrap();
    assert_eq!(first.rows, second.rows);

    let session = connector.session(0).unwrap();
    let requests = session.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].sql.is_some());
    assert!(!requests[0].is_reexecute());
    assert_eq!(requests[1].cursor_id, 1);
    assert!(requests[1].sql.is_none());
    assert!(requests[1].is_reexecute());
}

#[tokio::test]
async fn test_uncacheable_statement_closes_its_cursor() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();

    conn.execute(Query::new("select 1 from dual").keep_in_stmt_cache(false))
        .await
        .unwrap();
    assert_eq!(conn.with_statement_cache(|c| c.len()), Some(0));
    assert_eq!(
        conn.with_statement_cache(|c| c.cursors_to_close().to_vec()),
        Some(vec![1])
    );

    conn.ping().await.unwrap();
    let session = connector.session(0).unwrap();
    assert_eq!(session.closed_cursors(), vec![1]);
    let ping = session.requests_with(function::PING);
    assert_eq!(ping[0].closed_cursors, vec![1]);
}

#[tokio::test]
async fn test_evicted_cursor_closed_with_next_request() {
    let connector = MockConnector::new();
    let params = test_params().stmt_cache_size(2);
    let conn = Connection::connect(&connector, &params).await.unwrap();

    conn.execute("select 'a' from dual").await.unwrap();
    conn.execute("select 'b' from dual").await.unwrap();
    // evicts 'a', which holds cursor 1
    conn.execute("select 'c' from dual").await.unwrap();
    assert_eq!(
        conn.with_statement_cache(|c| c.cached_sql().iter().map(|s| s.to_string()).collect::<Vec<_>>()),
        Some(vec!["select 'c' from dual".to_string(), "select 'b' from dual".to_string()])
    );

    conn.execute("select 'b' from dual").await.unwrap();
    let session = connector.session(0).unwrap();
    let last = session.requests().pop().unwrap();
    assert_eq!(last.closed_cursors, vec![1]);
    assert!(last.is_reexecute());
    assert_eq!(last.cursor_id, 2);

    // the close list is sent once
    conn.ping().await.unwrap();
    assert_eq!(session.closed_cursors(), vec![1]);
}

#[tokio::test]
async fn test_disabled_cache_parses_every_time() {
    let connector = MockConnector::new();
    let params = test_params().stmt_cache_size(0);
    let conn = Connection::connect(&connector, &params).await.unwrap();

    conn.execute("select 1 from dual").await.unwrap();
    conn.execute("select 1 from dual").await.unwrap();

    let session = connector.session(0).unwrap();
    let requests = session.requests();
    assert!(requests.iter().all(|r| r.sql.is_some()));
    assert_eq!(requests[1].closed_cursors, vec![1]);
}

#[tokio::test]
async fn test_server_error_discards_cached_statement() {
    let connector = MockConnector::new();
    connector.fail_sql("select * from missing", 942, "table or view does not exist");
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();

    let err = conn.execute("select * from missing").await.unwrap_err();
    assert_eq!(err.server_code(), Some(942));
    assert!(err.to_string().starts_with("ORA-00942"));
    assert_eq!(conn.with_statement_cache(|c| c.contains("select * from missing")), Some(false));

    conn.ping().await.unwrap();
    assert_eq!(connector.session(0).unwrap().closed_cursors(), vec![1]);
}

#[tokio::test]
async fn test_session_switch_forgets_cursors() {
    let connector = MockConnector::new();
    let params = test_params().stmt_cache_size(1);
    let conn = Connection::connect(&connector, &params).await.unwrap();

    conn.execute("select 'a' from dual").await.unwrap();
    // evicts 'a': cursor 1 pending close
    conn.execute("select 'b' from dual").await.unwrap();
    assert_eq!(
        conn.with_statement_cache(|c| c.cursors_to_close().to_vec()),
        Some(vec![1])
    );

    connector.switch_session_on_next_response();
    conn.ping().await.unwrap();
    assert_eq!(
        conn.with_statement_cache(|c| (c.cursors_to_close().len(), c.open_count())),
        Some((0, 0))
    );

    // 'b' lost its cursor and is parsed again
    conn.execute("select 'b' from dual").await.unwrap();
    let last = connector.session(0).unwrap().requests().pop().unwrap();
    assert!(last.sql.is_some());
    assert!(last.closed_cursors.is_empty());
}

// =============================================================================
// Transactions and session lifecycle
// =============================================================================

#[tokio::test]
async fn test_transaction_state_follows_server() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();
    assert_eq!(conn.in_transaction(), Some(false));

    let result = conn
        .execute(Query::new("update emp set sal = sal * 2 where id = :1").bind(7))
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);
    assert_eq!(conn.in_transaction(), Some(true));

    conn.commit().await.unwrap();
    assert_eq!(conn.in_transaction(), Some(false));

    conn.execute(
        Query::new("delete from emp where id = :1")
            .bind(7)
            .auto_commit(true),
    )
    .await
    .unwrap();
    assert_eq!(conn.in_transaction(), Some(false));
}

#[tokio::test]
async fn test_close_rolls_back_and_logs_off() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();
    conn.execute("insert into t values (1)").await.unwrap();

    conn.close().await.unwrap();
    let session = connector.session(0).unwrap();
    assert_eq!(
        session.function_codes()[1..],
        [function::ROLLBACK, function::LOGOFF]
    );
    assert_eq!(session.disconnect_mode(), Some(DisconnectMode::Graceful));

    // closing again does nothing
    conn.close().await.unwrap();
    assert_eq!(session.requests().len(), 3);
    assert!(matches!(conn.ping().await, Err(Error::ConnectionClosed)));
    assert!(matches!(
        conn.execute("select 1 from dual").await,
        Err(Error::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_close_of_dropped_transport_skips_round_trips() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();
    let session = connector.session(0).unwrap();
    session.set_connected(false);
    assert!(!conn.is_connected());

    conn.close().await.unwrap();
    assert!(session.requests().is_empty());
    assert_eq!(session.disconnect_mode(), Some(DisconnectMode::Graceful));
}

#[tokio::test]
async fn test_standalone_drcp_close_deauthenticates() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &drcp_params()).await.unwrap();
    assert!(conn.is_drcp());

    conn.close().await.unwrap();
    let session = connector.session(0).unwrap();
    let released = session.requests_with(function::SESSION_RELEASE);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].release_mode, Some(ReleaseMode::Deauthenticate));
    assert!(session.requests_with(function::LOGOFF).is_empty());
}

#[tokio::test]
async fn test_pooled_drcp_release_keeps_transport() {
    let connector = MockConnector::new();
    let params = drcp_params().pooled(true).stmt_cache_size(5);
    let conn = Connection::connect(&connector, &params).await.unwrap();

    conn.execute("update t set x = 1").await.unwrap();
    conn.release_session().await.unwrap();

    let session = connector.session(0).unwrap();
    let codes = session.function_codes();
    assert_eq!(codes[1..], [function::ROLLBACK, function::SESSION_RELEASE]);
    assert_eq!(
        session.requests().pop().unwrap().release_mode,
        Some(ReleaseMode::Normal)
    );
    assert!(conn.is_connected());

    // the next statement is not cached while the session is re-established
    conn.execute("select 1 from dual").await.unwrap();
    assert_eq!(conn.with_statement_cache(|c| c.contains("select 1 from dual")), Some(false));
    conn.execute("select 1 from dual").await.unwrap();
    assert_eq!(conn.with_statement_cache(|c| c.contains("select 1 from dual")), Some(true));
}

#[tokio::test]
async fn test_release_session_is_noop_without_drcp() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();
    conn.release_session().await.unwrap();
    assert!(connector.session(0).unwrap().requests().is_empty());
}

#[tokio::test]
async fn test_failed_close_aborts_transport() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();
    conn.execute("insert into t values (1)").await.unwrap();

    let session = connector.session(0).unwrap();
    session.fail_requests(true);
    let err = conn.close().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(session.disconnect_mode(), Some(DisconnectMode::Abort));
    // no logoff after the failed rollback
    assert!(session.requests_with(function::LOGOFF).is_empty());
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn test_failed_ping_keeps_connection_open() {
    let connector = MockConnector::new();
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();
    let session = connector.session(0).unwrap();

    session.fail_pings(true);
    assert!(matches!(conn.ping().await, Err(Error::Transport(_))));
    assert!(conn.is_connected());
    assert_eq!(session.pings(), 1);

    session.fail_pings(false);
    conn.ping().await.unwrap();
}

#[tokio::test]
async fn test_warning_kept_until_released() {
    let connector = MockConnector::new();
    connector.warn_sql(
        "create or replace procedure p as begin null; end;",
        "ORA-24344: success with compilation error",
    );
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();
    assert!(conn.is_new_session());

    let result = conn
        .execute("create or replace procedure p as begin null; end;")
        .await
        .unwrap();
    assert!(result.warning.is_some());
    assert_eq!(result.warning, conn.warning());

    conn.mark_released();
    assert!(conn.warning().is_none());
    assert!(!conn.is_new_session());
    assert!(conn.idle_time() < Duration::from_secs(5));
}

// =============================================================================
// Operation lock
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_use_rejected_when_configured() {
    let connector = MockConnector::new();
    connector.set_request_delay(Duration::from_millis(100));
    let params = test_params().error_on_concurrent_execute(true);
    let conn = Connection::connect(&connector, &params).await.unwrap();

    let busy = conn.clone();
    let first = tokio::spawn(async move { busy.execute("select 1 from dual").await });
    tokio::task::yield_now().await;

    assert!(matches!(conn.ping().await, Err(Error::ConcurrentOperation)));
    // a busy connection still reports healthy
    assert!(conn.is_healthy());
    assert_eq!(conn.in_transaction(), None);

    first.await.unwrap().unwrap();
    conn.ping().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_use_queues_in_order() {
    let connector = MockConnector::new();
    connector.set_request_delay(Duration::from_millis(100));
    let conn = Connection::connect(&connector, &test_params()).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..3 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            conn.execute(format!("select {n} from dual")).await
        }));
        tokio::task::yield_now().await;
    }
    assert_eq!(conn.waiting_operations(), 2);

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let sql: Vec<_> = connector
        .session(0)
        .unwrap()
        .requests()
        .into_iter()
        .filter_map(|r| r.sql)
        .collect();
    assert_eq!(
        sql,
        ["select 0 from dual", "select 1 from dual", "select 2 from dual"]
    );
}
