//! Tracing conventions for database operations.
//!
//! Span names and field keys follow the OpenTelemetry database semantic
//! conventions so that a `tracing-opentelemetry` layer installed by the
//! application exports them unchanged:
//! - `db.system`: "oracle"
//! - `db.statement`: SQL statement (sanitized unless disabled)
//! - `db.operation`: leading keyword (SELECT, INSERT, ...)
//! - `db.connection_id`: client side connection id

use tracing::Span;

/// Database system identifier.
pub const DB_SYSTEM: &str = "oracle";

/// Span names for database operations.
pub mod span_names {
    /// Session establishment.
    pub const CONNECT: &str = "oracle.connect";
    /// Statement execution.
    pub const EXECUTE: &str = "oracle.execute";
    /// Round-trip ping.
    pub const PING: &str = "oracle.ping";
    /// Commit.
    pub const COMMIT: &str = "oracle.commit";
    /// Rollback.
    pub const ROLLBACK: &str = "oracle.rollback";
    /// Logoff or DRCP session release.
    pub const CLOSE: &str = "oracle.close";
    /// Any statement-less round trip; the operation goes in `otel.name`.
    pub const CALL: &str = "oracle.call";
    /// Pool checkout.
    pub const POOL_ACQUIRE: &str = "oracle.pool.acquire";
}

/// Span fields recorded once a round trip completes.
pub mod attributes {
    /// Number of rows affected.
    pub const DB_ROWS_AFFECTED: &str = "db.rows_affected";
    /// Server cursor.
    pub const DB_CURSOR_ID: &str = "db.oracle.cursor_id";
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to sanitize SQL statements.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Record statements verbatim (still truncated).
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }
        truncate_string(&sanitize_sql(sql, &self.placeholder), self.max_length)
    }
}

/// Replace string and numeric literals with `placeholder`. Bind names such
/// as `:1` and quoted identifiers are kept.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    continue;
                }
                in_string = false;
                result.push_str(placeholder);
            }
            continue;
        }

        if c == '\'' {
            in_string = true;
            continue;
        }

        if c.is_ascii_digit()
            && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_' || ch == ':')
        {
            while chars
                .peek()
                .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
            {
                chars.next();
            }
            result.push_str(placeholder);
            continue;
        }

        result.push(c);
    }

    if in_string {
        result.push_str(placeholder);
    }

    result
}

/// Truncate to at most `max_len` bytes, on a character boundary.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let keyword = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" => "SELECT",
        "INSERT" => "INSERT",
        "UPDATE" => "UPDATE",
        "DELETE" => "DELETE",
        "MERGE" => "MERGE",
        "BEGIN" | "DECLARE" | "CALL" => "PLSQL",
        "COMMIT" => "COMMIT",
        "ROLLBACK" => "ROLLBACK",
        "CREATE" => "CREATE",
        "ALTER" => "ALTER",
        "DROP" => "DROP",
        "TRUNCATE" => "TRUNCATE",
        _ => "OTHER",
    }
}

/// Span wrapping one statement execution. The cursor id and row count
/// are recorded by [`record_execute`] when the server answers.
#[must_use]
pub fn execute_span(connection_id: u64, sql: &str, sanitization: &SanitizationConfig) -> Span {
    tracing::debug_span!(
        span_names::EXECUTE,
        db.system = DB_SYSTEM,
        db.operation = extract_operation(sql),
        db.statement = %sanitization.sanitize(sql),
        db.connection_id = connection_id,
        db.rows_affected = tracing::field::Empty,
        db.oracle.cursor_id = tracing::field::Empty,
    )
}

/// Record the outcome of an execute on `span`.
pub fn record_execute(span: &Span, cursor_id: u32, rows_affected: u64) {
    span.record(attributes::DB_CURSOR_ID, cursor_id);
    span.record(attributes::DB_ROWS_AFFECTED, rows_affected);
}

/// Span wrapping a statement-less round trip (ping, commit, close...).
#[must_use]
pub fn call_span(name: &'static str, connection_id: u64) -> Span {
    tracing::debug_span!(
        span_names::CALL,
        otel.name = name,
        db.system = DB_SYSTEM,
        db.connection_id = connection_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_span_declares_outcome_fields() {
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).finish(),
        );
        let span = execute_span(7, "update t set x = 1", &SanitizationConfig::default());
        assert_eq!(span.metadata().map(|m| m.name()), Some(span_names::EXECUTE));
        assert!(span.field(attributes::DB_CURSOR_ID).is_some());
        assert!(span.field(attributes::DB_ROWS_AFFECTED).is_some());
        record_execute(&span, 3, 1);
    }

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM users"), "SELECT");
        assert_eq!(extract_operation("  select id from users"), "SELECT");
        assert_eq!(extract_operation("with q as (select 1 from dual) select * from q"), "SELECT");
        assert_eq!(extract_operation("INSERT INTO users VALUES (1)"), "INSERT");
        assert_eq!(extract_operation("merge into t using s on (1=1)"), "MERGE");
        assert_eq!(extract_operation("begin null; end;"), "PLSQL");
        assert_eq!(extract_operation("COMMIT"), "COMMIT");
        assert_eq!(extract_operation("truncate table t"), "TRUNCATE");
        assert_eq!(extract_operation("unknown stuff"), "OTHER");
        assert_eq!(extract_operation(""), "OTHER");
    }

    #[test]
    fn test_sanitize_sql() {
        let placeholder = "?";

        assert_eq!(
            sanitize_sql("SELECT * FROM users WHERE name = 'Alice'", placeholder),
            "SELECT * FROM users WHERE name = ?"
        );
        assert_eq!(
            sanitize_sql("SELECT * WHERE name = 'O''Brien'", placeholder),
            "SELECT * WHERE name = ?"
        );
        assert_eq!(
            sanitize_sql("SELECT * WHERE id = 42 AND name = 'test'", placeholder),
            "SELECT * WHERE id = ? AND name = ?"
        );
        // binds and quoted identifiers survive
        assert_eq!(
            sanitize_sql("SELECT \"Col1\" FROM t2 WHERE id = :1", placeholder),
            "SELECT \"Col1\" FROM t2 WHERE id = :1"
        );
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("héllo wörld", 5), "h...");
    }

    #[test]
    fn test_sanitization_config_no_sanitization() {
        let config = SanitizationConfig::no_sanitization();
        let sql = "SELECT * FROM users WHERE name = 'Alice'";
        assert_eq!(config.sanitize(sql), sql);
    }
}
