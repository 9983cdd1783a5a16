//! Statement execution requests and their results.

use ora_protocol::{Value, Variable};

use crate::error::{Error, Result};
use crate::statement::Statement;

/// A statement to execute together with its bind values and options.
///
/// ```rust
/// use ora_client::Query;
///
/// let query = Query::new("select * from emp where deptno = :dept")
///     .bind_named("dept", 10)
///     .prefetch_rows(100);
/// assert_eq!(query.sql(), "select * from emp where deptno = :dept");
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    sql: String,
    positional: Vec<Variable>,
    named: Vec<(String, Variable)>,
    keep_in_stmt_cache: bool,
    prefetch_rows: Option<u32>,
    auto_commit: bool,
}

impl Query {
    /// Create a new query from SQL text.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            positional: Vec::new(),
            named: Vec::new(),
            keep_in_stmt_cache: true,
            prefetch_rows: None,
            auto_commit: false,
        }
    }

    /// Get the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Add the next positional bind value.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(Variable::input(value.into()));
        self
    }

    /// Add the next positional bind variable (OUT, IN OUT, arrays).
    #[must_use]
    pub fn bind_variable(mut self, variable: Variable) -> Self {
        self.positional.push(variable);
        self
    }

    /// Bind a value by placeholder name.
    #[must_use]
    pub fn bind_named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named
            .push((name.into(), Variable::input(value.into())));
        self
    }

    /// Bind a variable by placeholder name.
    #[must_use]
    pub fn bind_named_variable(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.named.push((name.into(), variable));
        self
    }

    /// Whether the statement may be kept in the statement cache.
    #[must_use]
    pub fn keep_in_stmt_cache(mut self, keep: bool) -> Self {
        self.keep_in_stmt_cache = keep;
        self
    }

    /// Override the connection's prefetch row count.
    #[must_use]
    pub fn prefetch_rows(mut self, rows: u32) -> Self {
        self.prefetch_rows = Some(rows);
        self
    }

    /// Commit as part of the execute round trip.
    #[must_use]
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    pub(crate) fn cacheable(&self) -> bool {
        self.keep_in_stmt_cache
    }

    pub(crate) fn prefetch_override(&self) -> Option<u32> {
        self.prefetch_rows
    }

    pub(crate) fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Apply the bind values to `stmt`.
    pub(crate) fn apply_binds(&self, stmt: &mut Statement) -> Result<()> {
        match (self.positional.is_empty(), self.named.is_empty()) {
            (false, false) => Err(Error::Config(
                "positional and named binds cannot be mixed".into(),
            )),
            (true, false) => stmt.bind_named(self.named.clone()),
            _ => stmt.bind_positional(self.positional.clone()),
        }
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

/// Outcome of an execute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Rows fetched (queries only).
    pub rows: Vec<Vec<Value>>,
    /// Rows affected (DML only).
    pub rows_affected: u64,
    /// Values of OUT and IN OUT binds, in bind order.
    pub out_values: Vec<Value>,
    /// Success-with-info warning reported by the server.
    pub warning: Option<String>,
}
