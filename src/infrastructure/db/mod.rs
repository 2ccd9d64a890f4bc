//! sqlx-backed `SqlRunner`s.
//!
//! - Only read statements are accepted (`SELECT` / `WITH`); text inside
//!   quoted literals and identifiers is not inspected
//! - Every statement runs under the configured query timeout
//! - Driver failures are split into connection and query errors

pub mod postgres;
pub mod sqlite;

use crate::application::use_cases::query_executor::{DbType, RunError, SqlRunner};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::DatabaseSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub use postgres::PostgresRunner;
pub use sqlite::SqliteRunner;

static BLOCKED_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE|CREATE|GRANT|REVOKE|PRAGMA|ATTACH|DETACH|MERGE|COPY)\b",
    )
    .unwrap()
});

static QUOTED_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*""#).unwrap());

/// Reject anything that is not a single read statement.
pub fn ensure_read_only(sql: &str) -> std::result::Result<(), RunError> {
    let scanned = QUOTED_LITERAL.replace_all(sql, "''");
    let trimmed = scanned.trim().trim_end_matches(';');
    let upper = trimmed.to_uppercase();
    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return Err(RunError::Query("Only SELECT queries are allowed".to_string()));
    }
    if trimmed.contains(';') {
        return Err(RunError::Query(
            "Multiple statements are not allowed".to_string(),
        ));
    }
    if let Some(m) = BLOCKED_KEYWORDS.find(trimmed) {
        return Err(RunError::Query(format!(
            "Query contains forbidden keyword: {}",
            m.as_str().to_uppercase()
        )));
    }
    Ok(())
}

/// Transport and pool failures stop the request; everything else is the statement's fault.
pub fn classify(err: sqlx::Error) -> RunError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => RunError::Connection(err.to_string()),
        other => RunError::Query(other.to_string()),
    }
}

/// Runner for the configured driver, plus the placeholder style it expects.
pub async fn build_runner(settings: &DatabaseSettings) -> Result<(Arc<dyn SqlRunner>, DbType)> {
    match settings.driver {
        DbType::Postgres => Ok((Arc::new(PostgresRunner::connect(settings)?), DbType::Postgres)),
        DbType::Sqlite => Ok((
            Arc::new(SqliteRunner::connect(settings).await?),
            DbType::Sqlite,
        )),
        DbType::Pyformat => Err(AppError::ConfigurationError(
            "No bundled runner for pyformat drivers".to_string(),
        )),
    }
}
