use super::{classify, ensure_read_only};
use crate::application::use_cases::query_executor::{RunError, SqlParam, SqlRunner};
use crate::domain::error::{AppError, Result};
use crate::domain::outcome::QueryResult;
use crate::domain::value_type::{parse_date, ValueType};
use crate::infrastructure::config::DatabaseSettings;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Pool, Postgres, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct PostgresRunner {
    pool: Pool<Postgres>,
    query_timeout: Duration,
}

impl PostgresRunner {
    /// Lazy pool: the first statement opens the first connection.
    pub fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = PgConnectOptions::from_str(&settings.url).map_err(|e| {
            AppError::ConfigurationError(format!("Failed to parse connection string: {}", e))
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .connect_lazy_with(options);

        info!(
            max_connections = settings.max_connections,
            "Created PostgreSQL connection pool"
        );
        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(settings.query_timeout_secs),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, PartialEq)]
enum PgValue {
    Text(String),
    Date(chrono::NaiveDate),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Only parameters declared `date` bind as DATE; date-shaped text stays text.
fn pg_value(param: &SqlParam) -> PgValue {
    match &param.value {
        Value::String(s) => match param.value_type {
            ValueType::Date => parse_date(s)
                .map(PgValue::Date)
                .unwrap_or_else(|| PgValue::Text(s.clone())),
            _ => PgValue::Text(s.clone()),
        },
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                PgValue::Int(i)
            } else if let Some(f) = n.as_f64() {
                PgValue::Float(f)
            } else {
                PgValue::Text(n.to_string())
            }
        }
        Value::Bool(b) => PgValue::Bool(*b),
        Value::Null => PgValue::Null,
        other => PgValue::Text(other.to_string()),
    }
}

fn bind_value<'q>(query: Query<'q, Postgres, PgArguments>, param: &SqlParam) -> Query<'q, Postgres, PgArguments> {
    match pg_value(param) {
        PgValue::Text(s) => query.bind(s),
        PgValue::Date(d) => query.bind(d),
        PgValue::Int(i) => query.bind(i),
        PgValue::Float(f) => query.bind(f),
        PgValue::Bool(b) => query.bind(b),
        PgValue::Null => query.bind(Option::<String>::None),
    }
}

/// Extract a column value from a row as serde_json::Value
fn extract_column_value(row: &PgRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bigdecimal::BigDecimal>, _>(index) {
        return v
            .map(|d| {
                let text = d.to_string();
                serde_json::from_str::<serde_json::Number>(&text)
                    .map(Value::Number)
                    .unwrap_or(Value::String(text))
            })
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
        return v
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|dt| Value::String(dt.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null);
    }

    Value::Null
}

#[async_trait]
impl SqlRunner for PostgresRunner {
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

        debug!(rows = values.len(), "PostgreSQL statement returned");
        Ok(QueryResult::new(columns, values))
    }
}
