//! Values passed between pipeline stages and returned to callers.

use crate::domain::error::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    RegexMatch,
    Hint,
    Builtin,
    ModelFallback,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    pub value: Value,
    pub source: ExtractionSource,
}

/// Per-parameter extraction outcome. A parameter with no value maps to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub values: BTreeMap<String, Option<ExtractedValue>>,
}

impl ExtractionResult {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .and_then(|v| v.as_ref())
            .map(|v| &v.value)
            .filter(|v| !v.is_null())
    }

    pub fn source(&self, name: &str) -> Option<ExtractionSource> {
        self.values.get(name).and_then(|v| v.as_ref()).map(|v| v.source)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub should_proceed: bool,
    pub reason: String,
}

impl VerificationVerdict {
    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            should_proceed: true,
            reason: reason.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            should_proceed: false,
            reason: reason.into(),
        }
    }
}

/// Rows returned by the SQL collaborator, column order preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedResponse {
    /// Result columns in display priority order, truncated.
    pub summary_fields: Vec<String>,
    pub format: String,
    pub table: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Matching,
    Extracting,
    Validating,
    Verifying,
    Rendering,
    Executing,
    Done,
    NextCandidate,
    Exhausted,
}

/// What happened to one ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrace {
    pub template_id: String,
    pub similarity: f32,
    pub reranked_score: f32,
    pub stage_reached: PipelineStage,
    /// False when skipped below threshold without an extraction attempt.
    pub attempted: bool,
    pub rejection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Success {
        template_id: String,
        parameters: BTreeMap<String, Value>,
        sql: String,
        result: QueryResult,
        execution_time_ms: u64,
        tried_candidates: usize,
        response: FormattedResponse,
        #[serde(skip_serializing_if = "Option::is_none")]
        trace: Option<Vec<CandidateTrace>>,
    },
    Failure {
        error: ErrorKind,
        message: String,
        tried_candidates: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        trace: Option<Vec<CandidateTrace>>,
    },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success { .. })
    }

    pub fn tried_candidates(&self) -> usize {
        match self {
            QueryOutcome::Success {
                tried_candidates, ..
            }
            | QueryOutcome::Failure {
                tried_candidates, ..
            } => *tried_candidates,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            QueryOutcome::Success { .. } => None,
            QueryOutcome::Failure { error, .. } => Some(*error),
        }
    }

    pub fn trace(&self) -> Option<&[CandidateTrace]> {
        match self {
            QueryOutcome::Success { trace, .. } | QueryOutcome::Failure { trace, .. } => {
                trace.as_deref()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extraction_result_hides_nulls() {
        let mut result = ExtractionResult::default();
        result.values.insert(
            "patient_id".into(),
            Some(ExtractedValue {
                value: json!("123456"),
                source: ExtractionSource::RegexMatch,
            }),
        );
        result.values.insert("visit_date".into(), None);
        assert_eq!(result.get("patient_id"), Some(&json!("123456")));
        assert_eq!(result.get("visit_date"), None);
        assert_eq!(result.source("visit_date"), None);
    }

    #[test]
    fn test_failure_serializes_with_kind() {
        let outcome = QueryOutcome::Failure {
            error: ErrorKind::NoCandidateMatched,
            message: "no template above threshold".into(),
            tried_candidates: 0,
            trace: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"], "no_candidate_matched");
    }
}
