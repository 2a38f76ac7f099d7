//! `:name` placeholders.
//!
//! The server only understands positional `?` markers, so named SQL is
//! rewritten before it is prepared and the named values are laid out in
//! placeholder order.
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// Parameter values for a prepared statement
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Bindings {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

impl Bindings {
    /// Lay the values out in placeholder order.
    pub(crate) fn resolve(self, names: &[String]) -> Result<Vec<Value>> {
        match self {
            Bindings::None => Ok(Vec::new()),
            Bindings::Positional(values) => Ok(values),
            Bindings::Named(_) if names.is_empty() => Err(Error::InvalidParams(
                "named values given but the statement has no :name placeholders".to_string(),
            )),
            Bindings::Named(values) => names
                .iter()
                .map(|name| {
                    values
                        .get(name)
                        .cloned()
                        .ok_or_else(|| Error::InvalidParams(format!("missing value for :{name}")))
                })
                .collect(),
        }
    }
}

impl From<()> for Bindings {
    fn from(_: ()) -> Self {
        Bindings::None
    }
}

impl From<Vec<Value>> for Bindings {
    fn from(values: Vec<Value>) -> Self {
        Bindings::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Bindings {
    fn from(values: [Value; N]) -> Self {
        Bindings::Positional(values.into())
    }
}

impl From<HashMap<String, Value>> for Bindings {
    fn from(values: HashMap<String, Value>) -> Self {
        Bindings::Named(values)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for Bindings {
    fn from(values: [(K, Value); N]) -> Self {
        Bindings::Named(values.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// SQL with `:name` markers replaced by `?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub sql: String,
    pub names: Vec<String>,
}

/// Replace `:name` placeholders with `?`.
///
/// Quoted strings, quoted identifiers and comments are copied verbatim, and
/// `:=` assignments are left alone.
pub fn rewrite(sql: &str) -> Rewritten {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
            b'#' => i = skip_line(bytes, i),
            b'-' if bytes.get(i + 1) == Some(&b'-')
                && bytes.get(i + 2).is_none_or(|b| b.is_ascii_whitespace()) =>
            {
                i = skip_line(bytes, i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match sql[i + 2..].find("*/") {
                    Some(end) => i + 2 + end + 2,
                    None => bytes.len(),
                };
            }
            b':' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') => {
                let start = i + 1;
                let end = bytes[start..]
                    .iter()
                    .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                    .map_or(bytes.len(), |n| start + n);
                out.push_str(&sql[copied..i]);
                out.push('?');
                names.push(sql[start..end].to_string());
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);

    Rewritten { sql: out, names }
}

/// Index just past the closing quote. Backslash escapes and doubled quotes
/// stay inside the literal.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote != b'`' => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |n| start + n + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_names_in_order() {
        let rewritten = rewrite("SELECT * FROM t WHERE a = :a AND b > :b_2 OR a = :a");
        assert_eq!(rewritten.sql, "SELECT * FROM t WHERE a = ? AND b > ? OR a = ?");
        assert_eq!(rewritten.names, vec!["a", "b_2", "a"]);
    }

    #[test]
    fn leaves_literals_comments_and_assignments() {
        let sql = "SELECT ':x', \"it\\\"s :y\", `:z`, @v := 1 -- :c\n/* :d */ # :e\n, :f";
        let rewritten = rewrite(sql);
        assert_eq!(rewritten.names, vec!["f"]);
        assert!(rewritten.sql.ends_with(", ?"));
        assert!(rewritten.sql.starts_with("SELECT ':x'"));
    }

    #[test]
    fn doubled_quote_stays_in_literal() {
        let rewritten = rewrite("SELECT 'it''s :no', :yes");
        assert_eq!(rewritten.names, vec!["yes"]);
    }

    #[test]
    fn positional_sql_is_untouched() {
        let rewritten = rewrite("SELECT ? + 1");
        assert_eq!(rewritten.sql, "SELECT ? + 1");
        assert!(rewritten.names.is_empty());
    }

    #[test]
    fn named_bindings_follow_placeholder_order() {
        let names = rewrite("INSERT INTO t VALUES (:id, :name, :id)").names;
        let bindings = Bindings::from([("name", Value::from("x")), ("id", Value::from(7))]);
        assert_eq!(
            bindings.resolve(&names).unwrap(),
            vec![Value::Int(7), Value::String("x".to_string()), Value::Int(7)]
        );
    }

    #[test]
    fn missing_name_is_rejected() {
        let names = rewrite("SELECT :a, :b").names;
        let err = Bindings::from([("a", Value::Null)])
            .resolve(&names)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(msg) if msg.contains(":b")));
    }

    #[test]
    fn named_values_need_named_placeholders() {
        let err = Bindings::from([("a", Value::Null)]).resolve(&[]).unwrap_err();
        assert!(!err.is_fatal());
    }
}
