//! Response Formatter
//!
//! Orders result columns by domain priority, renders the rows in the
//! configured tabular format and writes a short deterministic summary.

use crate::domain::domain_model::{CompiledField, DomainModel};
use crate::domain::outcome::{FormattedResponse, QueryResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use tracing::warn;

/// Default priorities by semantic type, matched by substring in order.
const SEMANTIC_PRIORITIES: &[(&str, i32)] = &[
    ("identifier", 90),
    ("name", 85),
    ("status", 80),
    ("amount", 75),
    ("total", 75),
    ("date", 70),
    ("email", 65),
    ("description", 60),
];

const OTHER_SEMANTIC_PRIORITY: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Delimited,
    Markdown,
    Toon,
    Csv,
}

impl OutputFormat {
    /// Lenient lookup; unknown names fall back to delimited.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "delimited" | "pipe" | "text" => OutputFormat::Delimited,
            "markdown" | "md" | "table" => OutputFormat::Markdown,
            "toon" => OutputFormat::Toon,
            "csv" => OutputFormat::Csv,
            other => {
                warn!(format = other, "Unknown response format, using delimited");
                OutputFormat::Delimited
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Delimited => "delimited",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Toon => "toon",
            OutputFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatterOptions {
    pub format: OutputFormat,
    pub max_summary_fields: usize,
    pub max_table_rows: usize,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Delimited,
            max_summary_fields: 5,
            max_table_rows: 100,
        }
    }
}

/// Explicit priority, else the semantic-type default. `None` means unset.
pub fn field_priority(field: &CompiledField) -> Option<i32> {
    if let Some(priority) = field.def.summary_priority {
        return Some(priority);
    }
    let semantic = field.def.semantic_type.as_deref()?.to_lowercase();
    Some(
        SEMANTIC_PRIORITIES
            .iter()
            .find(|(key, _)| semantic.contains(key))
            .map(|(_, p)| *p)
            .unwrap_or(OTHER_SEMANTIC_PRIORITY),
    )
}

/// Column indices in display order.
pub fn order_columns(columns: &[String], domain: &DomainModel) -> Vec<usize> {
    let mut keyed: Vec<((u8, i32, usize), usize)> = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let key = match domain.field_for_column(column) {
                Some(field) => match field_priority(field) {
                    Some(p) => (0, -p, field.declaration_index),
                    None => (1, 0, field.declaration_index),
                },
                None => (2, 0, idx),
            };
            (key, idx)
        })
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, idx)| idx).collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace(['\n', '\r'], " "),
        other => other.to_string(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}${}.{}", sign, group_thousands(whole), cents)
}

/// Cell text with the field's `display_format` applied. Values that do not
/// fit the format are shown as returned.
pub fn display_text(value: &Value, field: Option<&CompiledField>) -> String {
    let format = field.and_then(|f| f.def.display_format.as_deref());
    let formatted = match format.map(str::to_lowercase).as_deref() {
        Some("currency") => numeric(value).map(currency),
        Some("percentage") | Some("percent") => {
            numeric(value).map(|ratio| format!("{:.1}%", ratio * 100.0))
        }
        Some("date") => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
            .map(|date| date.format("%B %d, %Y").to_string()),
        _ => None,
    };
    formatted.unwrap_or_else(|| cell_text(value))
}

pub struct ResponseFormatter {
    options: FormatterOptions,
}

impl ResponseFormatter {
    pub fn new(options: FormatterOptions) -> Self {
        Self { options }
    }

    pub fn format(&self, result: &QueryResult, domain: &DomainModel) -> FormattedResponse {
        let order = order_columns(&result.columns, domain);
        let headers: Vec<&str> = order.iter().map(|&i| result.columns[i].as_str()).collect();
        let fields: Vec<Option<&CompiledField>> = result
            .columns
            .iter()
            .map(|column| domain.field_for_column(column))
            .collect();
        let rows: Vec<Vec<String>> = result
            .rows
            .iter()
            .take(self.options.max_table_rows)
            .map(|row| {
                order
                    .iter()
                    .map(|&i| {
                        row.get(i)
                            .map(|value| display_text(value, fields[i]))
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        let (format, mut table) = match self.options.format {
            OutputFormat::Delimited => (OutputFormat::Delimited, render_delimited(&headers, &rows)),
            OutputFormat::Markdown => (OutputFormat::Markdown, render_markdown(&headers, &rows)),
            OutputFormat::Toon => (OutputFormat::Toon, render_toon(&headers, &rows)),
            OutputFormat::Csv => match render_csv(&headers, &rows) {
                Some(csv) => (OutputFormat::Csv, csv),
                None => (OutputFormat::Delimited, render_delimited(&headers, &rows)),
            },
        };
        let hidden = result.rows.len().saturating_sub(rows.len());
        if hidden > 0 && format != OutputFormat::Csv {
            let _ = write!(table, "\n... {} more row(s)", hidden);
        }

        let summary_fields: Vec<String> = headers
            .iter()
            .take(self.options.max_summary_fields)
            .map(|h| h.to_string())
            .collect();
        let summary = summarize(result, &order, &summary_fields, &fields, domain);

        FormattedResponse {
            summary_fields,
            format: format.as_str().to_string(),
            table,
            summary,
        }
    }
}

fn summarize(
    result: &QueryResult,
    order: &[usize],
    summary_fields: &[String],
    fields: &[Option<&CompiledField>],
    domain: &DomainModel,
) -> String {
    let subject = domain
        .primary_entity()
        .map(|(id, _)| domain.display_name(id).to_lowercase())
        .unwrap_or_else(|| "record".to_string());

    match result.rows.len() {
        0 => "No results found.".to_string(),
        1 => {
            let row = &result.rows[0];
            let parts: Vec<String> = order
                .iter()
                .take(summary_fields.len())
                .filter_map(|&i| {
                    let value = row.get(i)?;
                    if value.is_null() {
                        return None;
                    }
                    Some(format!("{}: {}", result.columns[i], display_text(value, fields[i])))
                })
                .collect();
            format!("Found 1 {}: {}.", subject, parts.join(", "))
        }
        n => format!(
            "Found {} {} records. Key fields: {}.",
            n,
            subject,
            summary_fields.join(", ")
        ),
    }
}

fn render_delimited(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = headers.join(" | ");
    for row in rows {
        out.push('\n');
        out.push_str(&row.join(" | "));
    }
    out
}

fn render_markdown(headers: &[&str], rows: &[Vec<String>]) -> String {
    let escape = |s: &str| s.replace('|', "\\|");
    let header: Vec<String> = headers.iter().map(|h| escape(h)).collect();
    let mut table = format!("| {} |\n|{}", header.join(" | "), "---|".repeat(headers.len()));

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| if cell.is_empty() { "NULL".to_string() } else { escape(cell) })
            .collect();
        let _ = write!(table, "\n| {} |", cells.join(" | "));
    }
    table
}

/// Token-oriented tabular form: one header line, one indented line per row.
fn render_toon(headers: &[&str], rows: &[Vec<String>]) -> String {
    let quote = |s: &str| {
        if s.contains([',', '"', ':']) || s.starts_with(' ') || s.ends_with(' ') {
            format!("\"{}\"", s.replace('"', "\\\""))
        } else {
            s.to_string()
        }
    };
    let mut out = format!("results[{}]{{{}}}:", rows.len(), headers.join(","));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| quote(c)).collect();
        let _ = write!(out, "\n  {}", cells.join(","));
    }
    out
}

#[cfg(feature = "csv-output")]
fn render_csv(headers: &[&str], rows: &[Vec<String>]) -> Option<String> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(headers).ok()?;
    for row in rows {
        writer.write_record(row).ok()?;
    }
    let bytes = writer.into_inner().ok()?;
    String::from_utf8(bytes).ok().map(|s| s.trim_end().to_string())
}

#[cfg(not(feature = "csv-output"))]
fn render_csv(_headers: &[&str], _rows: &[Vec<String>]) -> Option<String> {
    None
}
