use super::{classify, ensure_read_only};
use crate::application::use_cases::query_executor::{RunError, SqlParam, SqlRunner};
use crate::domain::error::{AppError, Result};
use crate::domain::outcome::QueryResult;
use crate::infrastructure::config::DatabaseSettings;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteRunner {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteRunner {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .map_err(|e| {
                AppError::ConfigurationError(format!("Failed to parse connection string: {}", e))
            })?;

        // An in-memory database exists per connection, so it gets exactly one.
        let max_connections = if settings.url.contains(":memory:") {
            1
        } else {
            settings.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| AppError::ConnectionError(format!("Failed to open SQLite database: {}", e)))?;

        info!(url = %settings.url, "Opened SQLite database");
        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(settings.query_timeout_secs),
        })
    }

    /// Direct pool access for schema setup outside the read-only path.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// SQLite has no DATE storage class; dates travel as ISO text.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &SqlParam,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match &param.value {
        Value::String(s) => query.bind(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::Bool(b) => query.bind(*b),
        Value::Null => query.bind(Option::<String>::None),
        other => query.bind(other.to_string()),
    }
}

fn extract_column_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v
            .map(|bytes| Value::String(hex::encode(bytes)))
            .unwrap_or(Value::Null);
    }
    Value::Null
}

#[async_trait]
impl SqlRunner for SqliteRunner {
    async fn run(&self, sql: &str, params: &[SqlParam]) -> std::result::Result<QueryResult, RunError> {
        ensure_read_only(sql)?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        let rows = tokio::time::timeout(self.query_timeout, query.fetch_all(&self.pool))
            .await
            .map_err(|_| {
                RunError::Query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(classify)?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let values: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|i| extract_column_value(row, i))
                    .collect()
            })
            .collect();

        debug!(rows = values.len(), "SQLite statement returned");
        Ok(QueryResult::new(columns, values))
    }
}
