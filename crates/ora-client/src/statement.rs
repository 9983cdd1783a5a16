//! Statement descriptors.
//!
//! A [`Statement`] remembers what the server already knows about a SQL
//! text: the cursor it was parsed into and the shape of the variables last
//! bound to it. As long as neither changes, executions can skip the parse
//! and metadata exchange and simply re-execute the cursor.

use ora_protocol::{BindDirection, ExecuteFlags, ExecuteRequest, OraType, Value, Variable};

use crate::error::{Error, Result};
use crate::parser;

/// Opaque handle to a statement owned by a [`StatementCache`](crate::StatementCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub(crate) u64);

/// Statement classification, derived from the first keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `SELECT` / `WITH`.
    Query,
    /// `INSERT`, `UPDATE`, `DELETE`, `MERGE`.
    Dml,
    /// `CREATE`, `ALTER`, `DROP` and other DDL.
    Ddl,
    /// Anonymous PL/SQL block or `CALL`.
    PlSql,
    /// `COMMIT` / `ROLLBACK`.
    TransactionControl,
    /// Anything else.
    Unknown,
}

/// What the server was last told about one bind placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct BindInfo {
    /// Normalized placeholder name.
    pub name: String,
    /// Whether the placeholder follows `RETURNING ... INTO`.
    pub is_return_bind: bool,
    /// Bind direction.
    pub direction: BindDirection,
    /// Bound type, `None` until first bound.
    pub ora_type: Option<OraType>,
    /// Maximum value size in bytes.
    pub max_size: u32,
    /// Number of values bound.
    pub num_elements: usize,
    /// Whether a PL/SQL array is bound.
    pub is_array: bool,
    /// Maximum number of array elements.
    pub max_array_size: u32,
    /// The currently bound variable.
    pub variable: Option<Variable>,
}

impl BindInfo {
    fn new(name: String, is_return_bind: bool) -> Self {
        Self {
            name,
            is_return_bind,
            direction: BindDirection::In,
            ora_type: None,
            max_size: 0,
            num_elements: 0,
            is_array: false,
            max_array_size: 0,
            variable: None,
        }
    }

    /// Record `variable`, returning whether its shape differs from what was
    /// previously bound.
    fn set_variable(&mut self, variable: Variable) -> bool {
        let changed = variable.max_size != self.max_size
            || variable.direction != self.direction
            || variable.is_array != self.is_array
            || variable.values.len() > self.num_elements
            || Some(variable.ora_type) != self.ora_type
            || variable.max_array_size != self.max_array_size;
        if changed {
            self.is_array = variable.is_array;
            self.num_elements = variable.values.len();
            self.max_size = variable.max_size;
            self.ora_type = Some(variable.ora_type);
            self.direction = variable.direction;
            self.max_array_size = variable.max_array_size;
        }
        let ref_cursor = variable.ora_type.requires_full_execute();
        self.variable = Some(variable);
        changed || ref_cursor
    }
}

/// A parsed SQL statement and its server-side state.
#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    kind: StatementKind,
    is_returning: bool,
    binds: Vec<BindInfo>,
    pub(crate) cursor_id: u32,
    pub(crate) in_use: bool,
    pub(crate) return_to_cache: bool,
    pub(crate) requires_full_execute: bool,
    pub(crate) num_columns: u32,
    pub(crate) query_vars: Vec<Vec<Value>>,
}

impl Statement {
    /// Parse `sql` into a fresh descriptor.
    #[must_use]
    pub fn parse(sql: &str) -> Self {
        let parsed = parser::parse(sql);
        Self {
            sql: sql.to_string(),
            kind: parsed.kind,
            is_returning: parsed.is_returning,
            binds: parsed
                .binds
                .into_iter()
                .map(|b| BindInfo::new(b.name, b.is_return_bind))
                .collect(),
            cursor_id: 0,
            in_use: false,
            return_to_cache: false,
            requires_full_execute: false,
            num_columns: 0,
            query_vars: Vec::new(),
        }
    }

    /// Structural copy: same SQL and bind names, no cursor, no bound
    /// values, never returned to the cache.
    #[must_use]
    pub(crate) fn copy(&self) -> Self {
        Self {
            sql: self.sql.clone(),
            kind: self.kind,
            is_returning: self.is_returning,
            binds: self
                .binds
                .iter()
                .map(|b| BindInfo::new(b.name.clone(), b.is_return_bind))
                .collect(),
            cursor_id: 0,
            in_use: false,
            return_to_cache: false,
            requires_full_execute: false,
            num_columns: 0,
            query_vars: Vec::new(),
        }
    }

    /// SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Statement classification.
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Whether this is a query.
    #[must_use]
    pub fn is_query(&self) -> bool {
        self.kind == StatementKind::Query
    }

    /// Whether this is DML.
    #[must_use]
    pub fn is_dml(&self) -> bool {
        self.kind == StatementKind::Dml
    }

    /// Whether this is DDL. DDL is never cached.
    #[must_use]
    pub fn is_ddl(&self) -> bool {
        self.kind == StatementKind::Ddl
    }

    /// Whether this is PL/SQL.
    #[must_use]
    pub fn is_plsql(&self) -> bool {
        self.kind == StatementKind::PlSql
    }

    /// Whether this is a DML `RETURNING ... INTO` statement.
    #[must_use]
    pub fn is_returning(&self) -> bool {
        self.is_returning
    }

    /// Bind placeholders in declared order.
    #[must_use]
    pub fn binds(&self) -> &[BindInfo] {
        &self.binds
    }

    /// Server cursor id, `0` when not parsed on the current session.
    #[must_use]
    pub fn cursor_id(&self) -> u32 {
        self.cursor_id
    }

    /// Whether an operation is currently using this descriptor.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Whether the descriptor goes back into the cache when returned.
    #[must_use]
    pub fn returns_to_cache(&self) -> bool {
        self.return_to_cache
    }

    /// Whether the next execution must send full metadata.
    #[must_use]
    pub fn requires_full_execute(&self) -> bool {
        self.requires_full_execute
    }

    /// Number of columns described for a query.
    #[must_use]
    pub fn num_columns(&self) -> u32 {
        self.num_columns
    }

    /// Rows fetched by the last execution.
    #[must_use]
    pub fn query_vars(&self) -> &[Vec<Value>] {
        &self.query_vars
    }

    /// Bind `variable` to the placeholder at `index`.
    ///
    /// Marks the statement as requiring a full execute when the bind shape
    /// changed or a REF CURSOR is bound.
    pub fn set_variable(&mut self, index: usize, variable: Variable) -> Result<()> {
        let expected = self.binds.len();
        let info = self.binds.get_mut(index).ok_or(Error::BindCount {
            expected,
            actual: index + 1,
        })?;
        if info.set_variable(variable) {
            self.requires_full_execute = true;
        }
        Ok(())
    }

    /// Bind values by position.
    pub fn bind_positional(&mut self, variables: Vec<Variable>) -> Result<()> {
        if variables.len() != self.binds.len() {
            return Err(Error::BindCount {
                expected: self.binds.len(),
                actual: variables.len(),
            });
        }
        for (index, variable) in variables.into_iter().enumerate() {
            self.set_variable(index, variable)?;
        }
        Ok(())
    }

    /// Bind values by placeholder name. A name bound to several placeholders
    /// sets all of them.
    pub fn bind_named(&mut self, variables: Vec<(String, Variable)>) -> Result<()> {
        let supplied = variables.len();
        for (name, variable) in variables {
            let name = normalize_bind_name(&name);
            let positions: Vec<usize> = self
                .binds
                .iter()
                .enumerate()
                .filter(|(_, b)| b.name == name)
                .map(|(i, _)| i)
                .collect();
            if positions.is_empty() {
                return Err(Error::UnknownBind(name));
            }
            for index in positions {
                self.set_variable(index, variable.clone())?;
            }
        }
        if self.binds.iter().any(|b| b.variable.is_none()) {
            let mut unique: Vec<&str> = self.binds.iter().map(|b| b.name.as_str()).collect();
            unique.sort_unstable();
            unique.dedup();
            return Err(Error::BindCount {
                expected: unique.len(),
                actual: supplied,
            });
        }
        Ok(())
    }

    /// Drop bound values and fetched rows.
    pub(crate) fn clear_values(&mut self) {
        for bind in &mut self.binds {
            bind.variable = None;
        }
        self.query_vars.clear();
    }

    /// Build the execute call for the current state.
    #[must_use]
    pub fn execute_request(&self, prefetch_rows: u32, auto_commit: bool) -> ExecuteRequest {
        let full_execute = self.cursor_id == 0 || self.requires_full_execute || self.is_ddl();
        let parse = self.cursor_id == 0 || self.is_ddl();

        let mut flags = ExecuteFlags::EXECUTE;
        if parse {
            flags |= ExecuteFlags::PARSE;
        }
        if !self.binds.is_empty() {
            flags |= ExecuteFlags::BIND;
        }
        if self.is_query() {
            if full_execute {
                flags |= ExecuteFlags::DEFINE;
            }
            if prefetch_rows > 0 {
                flags |= ExecuteFlags::FETCH;
            }
        }
        if full_execute {
            if self.is_plsql() {
                if !self.binds.is_empty() {
                    flags |= ExecuteFlags::PLSQL_BIND;
                }
            } else {
                flags |= ExecuteFlags::NOT_PLSQL;
            }
        }
        if auto_commit && !self.is_query() {
            flags |= ExecuteFlags::COMMIT;
        }

        ExecuteRequest {
            cursor_id: self.cursor_id,
            sql: parse.then(|| self.sql.clone()),
            flags,
            binds: self
                .binds
                .iter()
                .filter_map(|b| b.variable.clone())
                .collect(),
            prefetch_rows: if self.is_query() { prefetch_rows } else { 0 },
            full_execute,
        }
    }
}

/// Normalize a user supplied bind name the way the parser does.
pub(crate) fn normalize_bind_name(name: &str) -> String {
    let name = name.strip_prefix(':').unwrap_or(name);
    if let Some(quoted) = name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        quoted.to_string()
    } else if name.chars().all(char::is_numeric) {
        name.to_string()
    } else {
        name.to_uppercase()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ora_protocol::OraType;

    use super::*;

    #[test]
    fn test_rebinding_same_shape_keeps_reexecute() {
        let mut stmt = Statement::parse("select * from t where id = :id");
        stmt.bind_positional(vec![Variable::input(Value::from(1))]).unwrap();
        assert!(stmt.requires_full_execute());

        // the server has the cursor and the metadata now
        stmt.cursor_id = 7;
        stmt.requires_full_execute = false;

        stmt.bind_positional(vec![Variable::input(Value::from(2))]).unwrap();
        assert!(!stmt.requires_full_execute());
        let req = stmt.execute_request(2, false);
        assert!(req.is_reexecute());
        assert!(req.sql.is_none());
    }

    #[test]
    fn test_shape_change_requires_full_execute() {
        let mut stmt = Statement::parse("select * from t where name = :n");
        stmt.set_variable(0, Variable::input(Value::from("ab"))).unwrap();
        stmt.cursor_id = 7;
        stmt.requires_full_execute = false;

        // larger value
        stmt.set_variable(0, Variable::input(Value::from("abcdef"))).unwrap();
        assert!(stmt.requires_full_execute());
        stmt.requires_full_execute = false;

        // different type
        stmt.set_variable(0, Variable::input(Value::from(5))).unwrap();
        assert!(stmt.requires_full_execute());
        stmt.requires_full_execute = false;

        // direction
        stmt.set_variable(0, Variable::output(OraType::Number, 22)).unwrap();
        assert!(stmt.requires_full_execute());

        let req = stmt.execute_request(2, false);
        assert!(!req.is_reexecute());
        assert!(req.full_execute);
        assert!(!req.flags.contains(ExecuteFlags::PARSE));
    }

    #[test]
    fn test_ref_cursor_always_requires_full_execute() {
        let mut stmt = Statement::parse("begin open :rc for select 1 from dual; end;");
        let var = Variable::output(OraType::Cursor, 0);
        stmt.set_variable(0, var.clone()).unwrap();
        stmt.requires_full_execute = false;
        stmt.set_variable(0, var).unwrap();
        assert!(stmt.requires_full_execute());
    }

    #[test]
    fn test_bind_count_mismatch() {
        let mut stmt = Statement::parse("insert into t values (:a, :b)");
        assert!(matches!(
            stmt.bind_positional(vec![Variable::input(Value::from(1))]),
            Err(Error::BindCount {
                expected: 2,
                actual: 1
            })
        ));
        assert!(stmt.set_variable(5, Variable::input(Value::Null)).is_err());
    }

    #[test]
    fn test_bind_named() {
        let mut stmt = Statement::parse("select :a, :b, :a from dual");
        stmt.bind_named(vec![
            ("a".into(), Variable::input(Value::from(1))),
            (":B".into(), Variable::input(Value::from(2))),
        ])
        .unwrap();
        assert_eq!(stmt.execute_request(2, false).binds.len(), 3);

        let mut stmt = Statement::parse("select :a from dual");
        assert!(matches!(
            stmt.bind_named(vec![("zz".into(), Variable::input(Value::Null))]),
            Err(Error::UnknownBind(name)) if name == "ZZ"
        ));

        let mut stmt = Statement::parse("select :a, :b from dual");
        assert!(matches!(
            stmt.bind_named(vec![("a".into(), Variable::input(Value::Null))]),
            Err(Error::BindCount { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_copy_is_structural() {
        let mut stmt = Statement::parse("insert into t values (:a) returning id into :b");
        stmt.set_variable(0, Variable::input(Value::from(1))).unwrap();
        stmt.cursor_id = 4;
        stmt.return_to_cache = true;

        let copy = stmt.copy();
        assert_eq!(copy.sql(), stmt.sql());
        assert!(copy.is_returning());
        assert_eq!(copy.cursor_id(), 0);
        assert!(!copy.returns_to_cache());
        assert_eq!(copy.binds().len(), 2);
        assert!(copy.binds()[1].is_return_bind);
        assert!(copy.binds().iter().all(|b| b.variable.is_none()));
    }

    #[test]
    fn test_execute_flags() {
        let stmt = Statement::parse("select 1 from dual");
        let req = stmt.execute_request(2, true);
        assert!(req.flags.contains(
            ExecuteFlags::PARSE | ExecuteFlags::EXECUTE | ExecuteFlags::DEFINE | ExecuteFlags::FETCH
        ));
        assert!(!req.flags.contains(ExecuteFlags::COMMIT));
        assert_eq!(req.sql.as_deref(), Some("select 1 from dual"));

        let stmt = Statement::parse("begin :x := 1; end;");
        let req = stmt.execute_request(2, true);
        assert!(req.flags.contains(ExecuteFlags::PLSQL_BIND | ExecuteFlags::COMMIT));
        assert!(!req.flags.contains(ExecuteFlags::NOT_PLSQL));
        assert_eq!(req.prefetch_rows, 0);
    }

    #[test]
    fn test_normalize_bind_name() {
        assert_eq!(normalize_bind_name("name"), "NAME");
        assert_eq!(normalize_bind_name(":name"), "NAME");
        assert_eq!(normalize_bind_name("\"Mixed\""), "Mixed");
        assert_eq!(normalize_bind_name("1"), "1");
    }
}
