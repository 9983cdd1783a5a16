//! Per-connection statement cache.
//!
//! The cache owns every live [`Statement`] of a connection in an arena keyed
//! by [`StatementId`]. A bounded LRU map from SQL text to id decides which
//! descriptors survive between executions. Descriptors that leave the cache
//! give their server cursor back through a pending-close list, which is
//! flushed as a piggy-back on the next request.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use lru::LruCache;
use ora_protocol::WriteBuffer;

use crate::error::{Error, Result};
use crate::statement::{Statement, StatementId};

/// LRU cache of parsed statements plus cursor-close bookkeeping.
#[derive(Debug)]
pub struct StatementCache {
    max_size: usize,
    cached: Option<LruCache<String, StatementId>>,
    statements: HashMap<StatementId, Statement>,
    open: HashSet<StatementId>,
    cursors_to_close: Vec<u32>,
    next_id: u64,
}

impl StatementCache {
    /// Create a cache holding at most `max_size` statements. `0` disables
    /// caching.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            cached: NonZeroUsize::new(max_size).map(LruCache::new),
            statements: HashMap::new(),
            open: HashSet::new(),
            cursors_to_close: Vec::new(),
            next_id: 1,
        }
    }

    /// Configured capacity.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cached.as_ref().map_or(0, LruCache::len)
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `sql` is currently cached.
    #[must_use]
    pub fn contains(&self, sql: &str) -> bool {
        self.cached.as_ref().is_some_and(|c| c.contains(sql))
    }

    /// Cached SQL texts, most recently used first.
    #[must_use]
    pub fn cached_sql(&self) -> Vec<&str> {
        self.cached
            .as_ref()
            .map(|c| c.iter().map(|(sql, _)| sql.as_str()).collect())
            .unwrap_or_default()
    }

    /// Number of descriptors tracked as holding (or about to hold) a cursor.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Cursor ids waiting to be closed.
    #[must_use]
    pub fn cursors_to_close(&self) -> &[u32] {
        &self.cursors_to_close
    }

    /// Borrow a live descriptor.
    #[must_use]
    pub fn statement(&self, id: StatementId) -> Option<&Statement> {
        self.statements.get(&id)
    }

    /// Mutably borrow a live descriptor.
    pub fn statement_mut(&mut self, id: StatementId) -> Option<&mut Statement> {
        self.statements.get_mut(&id)
    }

    /// Hand out a descriptor for `sql`, marked in use.
    ///
    /// A cached, idle descriptor is reused and becomes most recently used.
    /// If the cached one is busy, or `cacheable` is false, a structural copy
    /// is returned that never enters the cache. Otherwise `sql` is parsed and,
    /// unless it is DDL or caching is disabled, inserted, evicting the least
    /// recently used entry on overflow.
    pub fn get_statement(&mut self, sql: &str, cacheable: bool) -> Result<StatementId> {
        if sql.is_empty() {
            return Ok(self.track(Statement::parse(sql)));
        }

        if let Some(cached) = self.cached.as_mut() {
            if let Some(&id) = cached.peek(sql) {
                let in_use = self.statements.get(&id).is_some_and(|s| s.in_use);
                if !in_use && cacheable {
                    cached.promote(sql);
                    if let Some(stmt) = self.statements.get_mut(&id) {
                        stmt.in_use = true;
                    }
                    self.open.insert(id);
                    tracing::trace!(statement_id = id.0, "statement cache hit");
                    return Ok(id);
                }
                let copy = self
                    .statements
                    .get(&id)
                    .map(Statement::copy)
                    .unwrap_or_else(|| Statement::parse(sql));
                tracing::trace!(statement_id = id.0, "cached statement busy, using a copy");
                return Ok(self.track(copy));
            }
        }

        let mut stmt = Statement::parse(sql);
        tracing::debug!(kind = ?stmt.kind(), "statement cache miss");
        if !cacheable || stmt.is_ddl() {
            return Ok(self.track(stmt));
        }
        let Some(cached) = self.cached.as_mut() else {
            return Ok(self.track(stmt));
        };

        stmt.return_to_cache = true;
        let id = StatementId(self.next_id);
        self.next_id += 1;
        let evicted = cached.push(sql.to_string(), id);
        stmt.in_use = true;
        self.statements.insert(id, stmt);
        self.open.insert(id);
        if let Some((_, evicted)) = evicted {
            self.evict(evicted)?;
        }
        Ok(id)
    }

    fn track(&mut self, mut stmt: Statement) -> StatementId {
        let id = StatementId(self.next_id);
        self.next_id += 1;
        stmt.in_use = true;
        self.statements.insert(id, stmt);
        self.open.insert(id);
        id
    }

    fn evict(&mut self, id: StatementId) -> Result<()> {
        let Some(stmt) = self.statements.get_mut(&id) else {
            return Ok(());
        };
        if stmt.in_use {
            // dies when its user returns it
            stmt.return_to_cache = false;
            return Ok(());
        }
        let cursor_id = stmt.cursor_id;
        self.statements.remove(&id);
        tracing::debug!(statement_id = id.0, cursor_id, "evicted statement");
        self.retire(id, cursor_id)
    }

    fn retire(&mut self, id: StatementId, cursor_id: u32) -> Result<()> {
        self.open.remove(&id);
        if cursor_id == 0 {
            return Ok(());
        }
        if self.cursors_to_close.contains(&cursor_id) {
            return Err(Error::Internal(format!(
                "cursor {cursor_id} is already pending close"
            )));
        }
        self.cursors_to_close.push(cursor_id);
        Ok(())
    }

    /// Give a descriptor back after use.
    ///
    /// Bound values and fetched rows are dropped. A descriptor that still
    /// belongs to the cache becomes idle; any other is retired and its
    /// cursor queued for close. Returning an already retired or idle
    /// descriptor does nothing.
    pub fn return_statement(&mut self, id: StatementId) -> Result<()> {
        let Some(stmt) = self.statements.get_mut(&id) else {
            return Ok(());
        };
        if !stmt.in_use {
            return Ok(());
        }
        stmt.clear_values();
        if stmt.return_to_cache {
            stmt.in_use = false;
            return Ok(());
        }
        let cursor_id = stmt.cursor_id;
        self.statements.remove(&id);
        self.retire(id, cursor_id)
    }

    /// Take a descriptor out of the cache after a server error, so that its
    /// cursor is closed rather than reused once it is returned.
    pub fn discard(&mut self, id: StatementId) {
        let Some(stmt) = self.statements.get_mut(&id) else {
            return;
        };
        if stmt.return_to_cache {
            stmt.return_to_cache = false;
            if let Some(cached) = self.cached.as_mut() {
                if cached.peek(stmt.sql()) == Some(&id) {
                    cached.pop(stmt.sql());
                }
            }
        }
    }

    /// Forget all server cursors after the physical session changed.
    ///
    /// Every descriptor loses its cursor id, only descriptors still in use
    /// stay tracked, and pending closes are dropped: they referred to the
    /// old session.
    pub fn clear_open_cursors(&mut self) {
        for stmt in self.statements.values_mut() {
            stmt.cursor_id = 0;
        }
        let statements = &self.statements;
        self.open
            .retain(|id| statements.get(id).is_some_and(|s| s.in_use));
        self.cursors_to_close.clear();
    }

    /// Write the pending-close list (count, then each id, in UB4 form) and
    /// clear it.
    pub fn write_cursors_to_close(&mut self, buf: &mut WriteBuffer) {
        buf.write_ub4(self.cursors_to_close.len() as u32);
        for cursor_id in self.cursors_to_close.drain(..) {
            buf.write_ub4(cursor_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ora_protocol::{ReadBuffer, Value, Variable};
    use proptest::prelude::*;

    use super::*;

    fn checkout(cache: &mut StatementCache, sql: &str, cursor_id: u32) -> StatementId {
        let id = cache.get_statement(sql, true).unwrap();
        let stmt = cache.statement_mut(id).unwrap();
        if stmt.cursor_id == 0 {
            stmt.cursor_id = cursor_id;
        }
        id
    }

    #[test]
    fn test_eviction_queues_cursor() {
        let mut cache = StatementCache::new(2);
        for (sql, cursor) in [("select 'A' from dual", 11), ("select 'B' from dual", 12)] {
            let id = checkout(&mut cache, sql, cursor);
            cache.return_statement(id).unwrap();
        }
        let id = checkout(&mut cache, "select 'C' from dual", 13);
        cache.return_statement(id).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("select 'A' from dual"));
        assert!(cache.contains("select 'B' from dual"));
        assert!(cache.contains("select 'C' from dual"));
        assert_eq!(cache.cursors_to_close(), &[11]);
    }

    #[test]
    fn test_hit_promotes_entry() {
        let mut cache = StatementCache::new(2);
        let a = checkout(&mut cache, "select 1 from dual", 1);
        cache.return_statement(a).unwrap();
        let b = checkout(&mut cache, "select 2 from dual", 2);
        cache.return_statement(b).unwrap();

        let again = checkout(&mut cache, "select 1 from dual", 99);
        assert_eq!(again, a);
        assert_eq!(cache.statement(a).unwrap().cursor_id(), 1);
        cache.return_statement(again).unwrap();

        let c = checkout(&mut cache, "select 3 from dual", 3);
        cache.return_statement(c).unwrap();
        assert_eq!(cache.cached_sql(), vec!["select 3 from dual", "select 1 from dual"]);
        assert_eq!(cache.cursors_to_close(), &[2]);
    }

    #[test]
    fn test_busy_statement_yields_copy() {
        let mut cache = StatementCache::new(5);
        let first = checkout(&mut cache, "select :a from dual", 21);
        let second = checkout(&mut cache, "select :a from dual", 22);
        assert_ne!(first, second);

        let (s1, s2) = (
            cache.statement(first).unwrap(),
            cache.statement(second).unwrap(),
        );
        assert_eq!(s1.sql(), s2.sql());
        assert_eq!(s1.binds().len(), s2.binds().len());
        assert!(s1.returns_to_cache());
        assert!(!s2.returns_to_cache());

        cache.return_statement(second).unwrap();
        cache.return_statement(first).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cursors_to_close(), &[22]);
        assert!(cache.statement(second).is_none());
    }

    #[test]
    fn test_uncacheable_and_ddl_are_not_cached() {
        let mut cache = StatementCache::new(5);
        let id = cache.get_statement("select 1 from dual", false).unwrap();
        cache.return_statement(id).unwrap();
        let id = cache.get_statement("create table t (a number)", true).unwrap();
        cache.return_statement(id).unwrap();
        let id = cache.get_statement("", true).unwrap();
        cache.return_statement(id).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.open_count(), 0);
    }

    #[test]
    fn test_zero_size_disables_cache() {
        let mut cache = StatementCache::new(0);
        let id = checkout(&mut cache, "select 1 from dual", 5);
        assert!(!cache.statement(id).unwrap().returns_to_cache());
        cache.return_statement(id).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.cursors_to_close(), &[5]);
    }

    #[test]
    fn test_evicting_in_use_statement() {
        let mut cache = StatementCache::new(1);
        let a = checkout(&mut cache, "select 'A' from dual", 31);
        let b = checkout(&mut cache, "select 'B' from dual", 32);
        // A is still in use, so it is only marked
        assert!(cache.cursors_to_close().is_empty());
        assert!(!cache.statement(a).unwrap().returns_to_cache());

        cache.return_statement(a).unwrap();
        assert_eq!(cache.cursors_to_close(), &[31]);
        cache.return_statement(b).unwrap();
        assert_eq!(cache.cached_sql(), vec!["select 'B' from dual"]);
    }

    #[test]
    fn test_double_return_is_noop() {
        let mut cache = StatementCache::new(5);
        let id = cache.get_statement("select 1 from dual", false).unwrap();
        cache.statement_mut(id).unwrap().cursor_id = 8;
        cache.return_statement(id).unwrap();
        cache.return_statement(id).unwrap();
        assert_eq!(cache.cursors_to_close(), &[8]);
    }

    #[test]
    fn test_duplicate_cursor_close_is_internal_error() {
        let mut cache = StatementCache::new(5);
        let a = cache.get_statement("select 1 from dual", false).unwrap();
        let b = cache.get_statement("select 1 from dual", false).unwrap();
        cache.statement_mut(a).unwrap().cursor_id = 8;
        cache.statement_mut(b).unwrap().cursor_id = 8;
        cache.return_statement(a).unwrap();
        assert!(matches!(cache.return_statement(b), Err(Error::Internal(_))));
    }

    #[test]
    fn test_return_clears_values() {
        let mut cache = StatementCache::new(5);
        let id = cache.get_statement("select :a from dual", true).unwrap();
        let stmt = cache.statement_mut(id).unwrap();
        stmt.set_variable(0, Variable::input(Value::from(1))).unwrap();
        stmt.query_vars.push(vec![Value::from(1)]);
        cache.return_statement(id).unwrap();

        let stmt = cache.statement(id).unwrap();
        assert!(!stmt.is_in_use());
        assert!(stmt.binds()[0].variable.is_none());
        assert!(stmt.query_vars().is_empty());
    }

    #[test]
    fn test_discard_removes_from_cache() {
        let mut cache = StatementCache::new(5);
        let id = checkout(&mut cache, "select * from missing", 41);
        cache.discard(id);
        cache.return_statement(id).unwrap();
        assert!(!cache.contains("select * from missing"));
        assert_eq!(cache.cursors_to_close(), &[41]);
    }

    #[test]
    fn test_clear_open_cursors() {
        let mut cache = StatementCache::new(1);
        let idle = checkout(&mut cache, "select 1 from dual", 1);
        cache.return_statement(idle).unwrap();
        let busy = checkout(&mut cache, "select 2 from dual", 2);
        assert_eq!(cache.cursors_to_close(), &[1]);

        cache.clear_open_cursors();
        assert!(cache.cursors_to_close().is_empty());
        assert_eq!(cache.open_count(), 1);
        assert_eq!(cache.statement(busy).unwrap().cursor_id(), 0);

        // a statement without a cursor closes nothing
        cache.return_statement(busy).unwrap();
        let other = checkout(&mut cache, "select 3 from dual", 0);
        cache.return_statement(other).unwrap();
        assert!(cache.cursors_to_close().is_empty());
    }

    #[test]
    fn test_write_cursors_to_close() {
        let mut cache = StatementCache::new(5);
        for (sql, cursor) in [("select 1 from dual", 3), ("select 2 from dual", 300)] {
            let id = cache.get_statement(sql, false).unwrap();
            cache.statement_mut(id).unwrap().cursor_id = cursor;
            cache.return_statement(id).unwrap();
        }

        let mut buf = WriteBuffer::new();
        cache.write_cursors_to_close(&mut buf);
        assert!(cache.cursors_to_close().is_empty());

        let bytes = buf.freeze();
        assert_eq!(&bytes[..], &[1, 2, 1, 3, 2, 1, 44]);
        let mut reader = ReadBuffer::new(&bytes);
        assert_eq!(reader.read_ub4().unwrap(), 2);
    }

    proptest! {
        #[test]
        fn prop_cache_matches_lru_model(
            size in 1usize..5,
            keys in proptest::collection::vec(0u8..8, 1..60),
        ) {
            let mut cache = StatementCache::new(size);
            let mut model: Vec<String> = Vec::new();
            let mut next_cursor = 1u32;

            for key in keys {
                let sql = format!("select {key} from dual");
                let id = cache.get_statement(&sql, true).unwrap();
                let stmt = cache.statement_mut(id).unwrap();
                if stmt.cursor_id == 0 {
                    stmt.cursor_id = next_cursor;
                    next_cursor += 1;
                }
                cache.return_statement(id).unwrap();

                model.retain(|s| s != &sql);
                model.insert(0, sql);
                model.truncate(size);

                prop_assert!(cache.len() <= size);
                prop_assert_eq!(cache.cached_sql(), model.iter().map(String::as_str).collect::<Vec<_>>());
            }

            let mut closed = cache.cursors_to_close().to_vec();
            let before = closed.len();
            closed.sort_unstable();
            closed.dedup();
            prop_assert_eq!(closed.len(), before);
        }
    }
}
