//! Query Executor
//!
//! Turns rendered template SQL into a driver-ready statement and hands it to
//! the SQL collaborator:
//! - `%(name)s` placeholders become `$n` (PostgreSQL), `?n` (SQLite) or stay
//!   as-is for pyformat drivers
//! - literal `%` is escaped for pyformat and unescaped for positional drivers
//! - values are ordered by first placeholder occurrence and keep the type
//!   their parameter declares
//! - a string bound straight after `LIKE` to a name-like parameter is
//!   wrapped as `%value%`
//!
//! Pooling, retries and timeouts belong to the `SqlRunner`.

use crate::domain::error::{AppError, Result};
use crate::domain::outcome::QueryResult;
use crate::domain::value_type::ValueType;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    #[default]
    Postgres,
    Sqlite,
    /// Drivers that take `%(name)s` natively.
    Pyformat,
}

/// Failure reported by a `SqlRunner`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    /// The datastore is unreachable; the whole request should stop.
    #[error("connection failure: {0}")]
    Connection(String),
    /// The statement failed; another candidate may still succeed.
    #[error("query failure: {0}")]
    Query(String),
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Connection(msg) => AppError::ConnectionError(msg),
            RunError::Query(msg) => AppError::QueryExecutionError(msg),
        }
    }
}

/// A bound value and the type its template parameter declares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlParam {
    pub value: Value,
    pub value_type: ValueType,
}

impl SqlParam {
    pub fn new(value: Value, value_type: ValueType) -> Self {
        Self { value, value_type }
    }
}

#[async_trait]
pub trait SqlRunner: Send + Sync {
    async fn run(&self, sql: &str, params: &[SqlParam]) -> std::result::Result<QueryResult, RunError>;
}

/// Driver-ready SQL with its ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub param_names: Vec<String>,
}

static LIKE_BEFORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bi?like\s*$").unwrap());

/// `%value%` for a name-like string bound as a `LIKE` operand.
fn like_operand(name: &str, param: &SqlParam, sql_before: &str) -> SqlParam {
    let Value::String(text) = &param.value else {
        return param.clone();
    };
    if !name.to_lowercase().contains("name") || !LIKE_BEFORE.is_match(sql_before) {
        return param.clone();
    }
    let core = text.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
    if core.contains('%') {
        return param.clone();
    }
    SqlParam::new(Value::String(format!("%{}%", core)), param.value_type)
}

fn get_placeholder(db_type: DbType, name: &str, index: usize) -> String {
    match db_type {
        DbType::Postgres => format!("${}", index),
        DbType::Sqlite => format!("?{}", index),
        DbType::Pyformat => format!("%({})s", name),
    }
}

/// Length of a `(name)s` tail starting at `rest`, and the name.
fn placeholder_at(rest: &str) -> Option<(usize, &str)> {
    let inner = rest.strip_prefix('(')?;
    let close = inner.find(')')?;
    let name = &inner[..close];
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid && inner[close + 1..].starts_with('s') {
        Some((close + 3, name))
    } else {
        None
    }
}

/// Rewrite placeholders for `db_type` and collect their values from `bound`.
/// A placeholder with no bound value is a `QueryExecutionError`.
pub fn prepare(
    sql: &str,
    bound: &BTreeMap<String, SqlParam>,
    db_type: DbType,
) -> Result<PreparedStatement> {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut params = Vec::new();
    let mut rest = sql;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some((len, name)) = placeholder_at(after) {
            let index = match names.iter().position(|n| n == name) {
                Some(i) => i + 1,
                None => {
                    let param = bound
                        .get(name)
                        .filter(|p| !p.value.is_null())
                        .ok_or_else(|| {
                            AppError::QueryExecutionError(format!(
                                "Placeholder '%({})s' has no bound value",
                                name
                            ))
                        })?;
                    names.push(name.to_string());
                    params.push(like_operand(name, param, &out));
                    names.len()
                }
            };
            out.push_str(&get_placeholder(db_type, name, index));
            rest = &after[len..];
            continue;
        }

        let escaped = after.starts_with('%');
        match db_type {
            DbType::Pyformat => out.push_str("%%"),
            DbType::Postgres | DbType::Sqlite => out.push('%'),
        }
        rest = if escaped { &after[1..] } else { after };
    }
    out.push_str(rest);

    Ok(PreparedStatement {
        sql: out,
        params,
        param_names: names,
    })
}

pub struct QueryExecutor {
    runner: Arc<dyn SqlRunner>,
    db_type: DbType,
}

impl QueryExecutor {
    pub fn new(runner: Arc<dyn SqlRunner>, db_type: DbType) -> Self {
        Self { runner, db_type }
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    pub async fn execute(
        &self,
        sql: &str,
        bound: &BTreeMap<String, SqlParam>,
    ) -> Result<(PreparedStatement, QueryResult)> {
        let statement = prepare(sql, bound, self.db_type)?;
        debug!(sql = %statement.sql, params = statement.params.len(), "Executing statement");

        let start = Instant::now();
        let result = self.runner.run(&statement.sql, &statement.params).await?;
        info!(
            rows = result.row_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok((statement, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::FakeRunner;
    use serde_json::json;

    fn bound(pairs: &[(&str, Value, ValueType)]) -> BTreeMap<String, SqlParam> {
        pairs
            .iter()
            .map(|(k, v, t)| (k.to_string(), SqlParam::new(v.clone(), *t)))
            .collect()
    }

    fn values(stmt: &PreparedStatement) -> Vec<Value> {
        stmt.params.iter().map(|p| p.value.clone()).collect()
    }

    #[test]
    fn test_postgres_placeholders_in_order() {
        let stmt = prepare(
            "SELECT * FROM t WHERE a = %(a)s AND b > %(b)s",
            &bound(&[("b", json!(2), ValueType::Int), ("a", json!("x"), ValueType::String)]),
            DbType::Postgres,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = $1 AND b > $2");
        assert_eq!(values(&stmt), vec![json!("x"), json!(2)]);
        assert_eq!(stmt.params[1].value_type, ValueType::Int);
    }

    #[test]
    fn test_repeated_placeholder_reuses_index() {
        let stmt = prepare(
            "SELECT * FROM t WHERE a = %(a)s OR c = %(a)s",
            &bound(&[("a", json!(1), ValueType::Int)]),
            DbType::Sqlite,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = ?1 OR c = ?1");
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_percent_escaping() {
        let sql = "SELECT * FROM t WHERE name LIKE 'A%' AND pct = '100%%' AND id = %(id)s";
        let b = bound(&[("id", json!(7), ValueType::Int)]);
        let pg = prepare(sql, &b, DbType::Postgres).unwrap();
        assert_eq!(
            pg.sql,
            "SELECT * FROM t WHERE name LIKE 'A%' AND pct = '100%' AND id = $1"
        );
        let py = prepare(sql, &b, DbType::Pyformat).unwrap();
        assert_eq!(
            py.sql,
            "SELECT * FROM t WHERE name LIKE 'A%%' AND pct = '100%%' AND id = %(id)s"
        );
    }

    #[test]
    fn test_unbound_placeholder_is_query_error() {
        let err = prepare("SELECT %(missing)s", &BTreeMap::new(), DbType::Postgres).unwrap_err();
        assert!(matches!(err, AppError::QueryExecutionError(_)));
        let err = prepare(
            "SELECT %(nullish)s",
            &bound(&[("nullish", Value::Null, ValueType::String)]),
            DbType::Postgres,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::QueryExecutionError(_)));
    }

    #[test]
    fn test_malformed_placeholder_is_literal() {
        let stmt = prepare("SELECT '%(not closed'", &BTreeMap::new(), DbType::Sqlite).unwrap();
        assert_eq!(stmt.sql, "SELECT '%(not closed'");
    }

    #[test]
    fn test_name_like_operands_are_wrapped() {
        let b = bound(&[
            ("full_name", json!(" 'Jane' "), ValueType::String),
            ("city", json!("Austin"), ValueType::String),
            ("last_name", json!("Do%"), ValueType::String),
        ]);
        let stmt = prepare(
            "SELECT * FROM t WHERE full_name ILIKE %(full_name)s AND city LIKE %(city)s AND last_name like %(last_name)s",
            &b,
            DbType::Postgres,
        )
        .unwrap();
        assert_eq!(values(&stmt), vec![json!("%Jane%"), json!("Austin"), json!("Do%")]);

        let exact = prepare("SELECT * FROM t WHERE full_name = %(full_name)s", &b, DbType::Postgres).unwrap();
        assert_eq!(values(&exact), vec![json!(" 'Jane' ")]);
    }

    #[tokio::test]
    async fn test_runner_errors_are_classified() {
        let runner = Arc::new(FakeRunner::replying(vec![
            Err(RunError::Query("no such column".into())),
            Err(RunError::Connection("refused".into())),
        ]));
        let executor = QueryExecutor::new(runner.clone(), DbType::Sqlite);
        let b = BTreeMap::new();
        assert!(matches!(
            executor.execute("SELECT 1", &b).await,
            Err(AppError::QueryExecutionError(_))
        ));
        assert!(matches!(
            executor.execute("SELECT 1", &b).await,
            Err(AppError::ConnectionError(_))
        ));
        assert_eq!(runner.call_count(), 2);
    }
}
