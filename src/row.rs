use std::collections::HashMap;
use std::sync::Arc;

use crate::col::Column;
use crate::constant::ServerStatusFlags;
use crate::protocol::response::OkPayload;
use crate::value::Value;

/// A decoded row.
///
/// Rows are keyed by column name unless `rows_as_array` is set, in which case
/// they keep the declared column order and skip building the name map. With
/// `nest_tables` they are keyed by table alias, then column name;
/// `rows_as_array` takes precedence over it.
///
/// When two columns share a key, the one declared last wins. A join
/// returning `a.id` and `b.id` therefore keeps only `b.id` in a named row
/// and both in a nested one. Columns without a table, such as computed
/// expressions, are nested under `""`.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Named(HashMap<String, Value>),
    Nested(HashMap<String, HashMap<String, Value>>),
    Positional(Vec<Value>),
}

impl Row {
    /// Value of the column called `name`. Only named rows answer this.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Row::Named(map) => map.get(name),
            Row::Nested(_) | Row::Positional(_) => None,
        }
    }

    /// Value of column `name` from `table`. Only nested rows answer this.
    pub fn get_in(&self, table: &str, name: &str) -> Option<&Value> {
        match self {
            Row::Nested(tables) => tables.get(table)?.get(name),
            Row::Named(_) | Row::Positional(_) => None,
        }
    }

    /// Value at `index` in declared column order. Only positional rows
    /// answer this.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Row::Named(_) | Row::Nested(_) => None,
            Row::Positional(values) => values.get(index),
        }
    }

    /// Number of values held, after any key collisions.
    pub fn len(&self) -> usize {
        match self {
            Row::Named(map) => map.len(),
            Row::Nested(tables) => tables.values().map(HashMap::len).sum(),
            Row::Positional(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Columns and rows of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Arc<[Column]>,
    pub rows: Vec<Row>,
}

/// Everything a query or statement execution produced.
///
/// A statement that returns no rows yields no result sets; `affected_rows`
/// and `last_insert_id` sum and track the OK packets of every statement in
/// a multi-statement batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub result_sets: Vec<ResultSet>,
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
    pub status: ServerStatusFlags,
    pub info: String,
}

impl QueryResult {
    /// Rows of the first result set
    pub fn rows(&self) -> &[Row] {
        self.result_sets
            .first()
            .map(|set| set.rows.as_slice())
            .unwrap_or_default()
    }

    pub fn columns(&self) -> Option<&Arc<[Column]>> {
        self.result_sets.first().map(|set| &set.columns)
    }

    pub(crate) fn absorb_ok(&mut self, ok: &OkPayload) {
        self.affected_rows += ok.affected_rows;
        if ok.last_insert_id != 0 {
            self.last_insert_id = ok.last_insert_id;
        }
        self.warnings = self.warnings.saturating_add(ok.warnings);
        self.status = ok.status_flags;
        if !ok.info.is_empty() {
            self.info = ok.info.clone();
        }
    }
}
