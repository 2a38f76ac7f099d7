//! Least-recently-used cache of server-side prepared statements.
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::trace;

use crate::col::Column;

/// A statement prepared on the server.
///
/// Cheap to clone; the metadata is shared with the cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub(crate) id: u32,
    pub(crate) sql: Arc<str>,
    pub(crate) names: Arc<[String]>,
    pub(crate) params: Arc<[Column]>,
    pub(crate) columns: Arc<[Column]>,
}

impl Statement {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// SQL text as given to `prepare`
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// `:name` placeholders in order of appearance, empty for positional SQL
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    pub fn params(&self) -> &[Column] {
        &self.params
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

pub struct StatementCache {
    entries: LruCache<Arc<str>, Statement>,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a statement and mark it most recently used.
    pub fn get(&mut self, sql: &str) -> Option<Statement> {
        match self.entries.get(sql) {
            Some(statement) => {
                self.hits += 1;
                trace!(id = statement.id, "statement cache hit");
                Some(statement.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up a statement without counting it or changing its recency.
    pub fn peek(&self, sql: &str) -> Option<Statement> {
        self.entries.peek(sql).cloned()
    }

    /// Insert a freshly prepared statement.
    ///
    /// Returns the statement whose server-side id must now be closed: the
    /// least recently used entry when the cache was full, or an older entry
    /// for the same SQL carrying a different id.
    pub fn insert(&mut self, statement: Statement) -> Option<Statement> {
        let id = statement.id;
        let displaced = self
            .entries
            .push(Arc::clone(&statement.sql), statement)
            .map(|(_, old)| old)
            .filter(|old| old.id != id);
        if let Some(old) = &displaced {
            trace!(evicted = old.id, inserted = id, "statement evicted");
        }
        displaced
    }

    /// Forget the entry holding statement `id`, if any.
    pub fn remove_id(&mut self, id: u32) -> Option<Statement> {
        let key = self
            .entries
            .iter()
            .find(|(_, statement)| statement.id == id)
            .map(|(key, _)| Arc::clone(key))?;
        self.entries.pop(&key)
    }

    /// Drop every entry without closing anything on the server.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
