//! Intent Query Resolution Pipeline
//!
//! Drives one natural-language query through the whole chain:
//!
//! ```text
//! Matching -> Extracting -> Validating -> Verifying -> Rendering -> Executing -> Done
//!                 |             |             |                        |
//!                 +-------------+------ NextCandidate -----------------+
//! ```
//!
//! Candidates are tried strictly in rank order. Per-candidate failures are
//! recorded in the trace and the next candidate is tried; connection failures
//! and cancellation end the request immediately. When no candidate survives
//! the outcome is `NoCandidateMatched`.

use crate::application::use_cases::parameter_extractor::ParameterExtractor;
use crate::application::use_cases::parameter_validator::ParameterValidator;
use crate::application::use_cases::query_executor::{DbType, QueryExecutor, SqlRunner};
use crate::application::use_cases::response_formatter::{FormatterOptions, ResponseFormatter};
use crate::application::use_cases::template_library::{
    EmbeddingOracle, LibrarySnapshot, TemplateLibrary,
};
use crate::application::use_cases::template_matcher::{MatchCandidate, TemplateMatcher};
use crate::application::use_cases::template_processor::TemplateProcessor;
use crate::application::use_cases::verification_gate::VerificationGate;
use crate::domain::domain_model::DomainDefinition;
use crate::domain::error::{AppError, ErrorKind, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::outcome::{CandidateTrace, PipelineStage, QueryOutcome, QueryResult};
use crate::domain::query_template::TemplateDefinition;
use crate::infrastructure::llm_clients::LLMClient;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;


pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub top_k: usize,
    /// Upper bound on extraction attempts. `None` means `top_k`.
    pub max_candidates: Option<usize>,
    pub similarity_threshold: f32,
    /// Attach the per-candidate trace to every outcome.
    pub debug_trace: bool,
    pub response: FormatterOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_candidates: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            debug_trace: false,
            response: FormatterOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn max_candidates(&self) -> usize {
        self.max_candidates.unwrap_or(self.top_k)
    }
}

/// Collaborators shared by every request of one pipeline instance.
pub struct PipelineContext {
    pub library: Arc<TemplateLibrary>,
    pub embedder: Arc<dyn EmbeddingOracle>,
    pub llm: Option<Arc<dyn LLMClient>>,
    pub llm_config: LLMConfig,
    pub runner: Arc<dyn SqlRunner>,
    pub db_type: DbType,
    pub model_fallback: bool,
    pub verification_enabled: bool,
}

/// What survived of a candidate that made it through execution.
struct Accepted {
    parameters: BTreeMap<String, Value>,
    sql: String,
    result: QueryResult,
    execution_time_ms: u64,
}

enum Attempt {
    Accepted(Accepted),
    Rejected { stage: PipelineStage, reason: String },
}

pub struct IntentPipeline {
    library: Arc<TemplateLibrary>,
    matcher: TemplateMatcher,
    extractor: ParameterExtractor,
    gate: VerificationGate,
    executor: QueryExecutor,
    formatter: ResponseFormatter,
    config: PipelineConfig,
}

impl IntentPipeline {
    pub fn new(ctx: PipelineContext, config: PipelineConfig) -> Self {
        let gate = match (&ctx.llm, ctx.verification_enabled) {
            (Some(llm), true) => VerificationGate::new(Arc::clone(llm), ctx.llm_config.clone()),
            _ => VerificationGate::disabled(),
        };
        Self {
            library: ctx.library,
            matcher: TemplateMatcher::new(ctx.embedder),
            extractor: ParameterExtractor::new(ctx.llm, ctx.llm_config, ctx.model_fallback),
            gate,
            executor: QueryExecutor::new(ctx.runner, ctx.db_type),
            formatter: ResponseFormatter::new(config.response.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    /// Swap in a new library generation. In-flight requests keep the old one.
    pub async fn reload(
        &self,
        domain: DomainDefinition,
        templates: Vec<TemplateDefinition>,
    ) -> Result<usize> {
        self.library.reload(domain, templates).await
    }

    pub async fn resolve(&self, query: &str) -> QueryOutcome {
        self.resolve_with_cancel(query, &CancellationToken::new()).await
    }

    /// Resolve `query`, cancelling it when `interrupt` completes first. The
    /// request still runs to its own terminal outcome, so an interrupt that
    /// lands mid-candidate yields `Cancelled` with the attempts counted.
    pub async fn resolve_until<F>(&self, query: &str, interrupt: F) -> QueryOutcome
    where
        F: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();
        let resolve = self.resolve_with_cancel(query, &cancel);
        tokio::pin!(resolve);
        tokio::pin!(interrupt);

        tokio::select! {
            biased;
            _ = &mut interrupt => {
                debug!("Interrupt received, cancelling request");
                cancel.cancel();
            }
            outcome = &mut resolve => return outcome,
        }
        resolve.await
    }

    pub async fn resolve_with_cancel(&self, query: &str, cancel: &CancellationToken) -> QueryOutcome {
        let start = Instant::now();
        let mut trace = Vec::new();
        let mut tried = 0usize;

        let request_id = Uuid::new_v4();
        let span = info_span!("resolve", request_id = %request_id);

        let outcome = match self
            .run(query, cancel, &mut trace, &mut tried)
            .instrument(span.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, tried_candidates = tried, "Query resolution aborted");
                QueryOutcome::Failure {
                    error: e.kind(),
                    message: e.to_string(),
                    tried_candidates: tried,
                    trace: None,
                }
            }
        };

        span.in_scope(|| {
            info!(
                success = outcome.is_success(),
                tried_candidates = tried,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Query resolved"
            )
        });
        self.attach_trace(outcome, trace)
    }

    fn attach_trace(&self, outcome: QueryOutcome, collected: Vec<CandidateTrace>) -> QueryOutcome {
        if !self.config.debug_trace {
            return outcome;
        }
        match outcome {
            QueryOutcome::Success {
                template_id,
                parameters,
                sql,
                result,
                execution_time_ms,
                tried_candidates,
                response,
                ..
            } => QueryOutcome::Success {
                template_id,
                parameters,
                sql,
                result,
                execution_time_ms,
                tried_candidates,
                response,
                trace: Some(collected),
            },
            QueryOutcome::Failure {
                error,
                message,
                tried_candidates,
                ..
            } => QueryOutcome::Failure {
                error,
                message,
                tried_candidates,
                trace: Some(collected),
            },
        }
    }

    /// `Err` only for fatal errors; per-candidate failures become trace entries.
    async fn run(
        &self,
        query: &str,
        cancel: &CancellationToken,
        trace: &mut Vec<CandidateTrace>,
        tried: &mut usize,
    ) -> Result<QueryOutcome> {
        check_cancelled(cancel, PipelineStage::Matching)?;
        let snapshot = self.library.snapshot()?;
        let candidates = self
            .matcher
            .find_matches(query, &snapshot, self.config.top_k)
            .await?;
        debug!(candidates = candidates.len(), "Matching complete");

        let limit = self.config.max_candidates();
        for candidate in &candidates {
            if *tried >= limit {
                debug!(limit, "Candidate budget exhausted");
                break;
            }
            let mut entry = CandidateTrace {
                template_id: candidate.template.id.clone(),
                similarity: candidate.similarity,
                reranked_score: candidate.reranked_score,
                stage_reached: PipelineStage::Matching,
                attempted: false,
                rejection: None,
            };

            if candidate.similarity < self.config.similarity_threshold {
                debug!(
                    template_id = %candidate.template.id,
                    similarity = candidate.similarity,
                    threshold = self.config.similarity_threshold,
                    "Candidate below similarity threshold"
                );
                entry.rejection = Some(format!(
                    "similarity {:.3} below threshold {:.3}",
                    candidate.similarity, self.config.similarity_threshold
                ));
                trace.push(entry);
                continue;
            }

            *tried += 1;
            entry.attempted = true;
            let attempt = self.attempt(query, &snapshot, candidate, cancel, &mut entry).await;
            match attempt {
                Ok(Attempt::Accepted(accepted)) => {
                    entry.stage_reached = PipelineStage::Done;
                    trace.push(entry);
                    let response = self.formatter.format(&accepted.result, &snapshot.domain);
                    info!(
                        template_id = %candidate.template.id,
                        rows = accepted.result.row_count,
                        tried_candidates = *tried,
                        "Candidate accepted"
                    );
                    return Ok(QueryOutcome::Success {
                        template_id: candidate.template.id.clone(),
                        parameters: accepted.parameters,
                        sql: accepted.sql,
                        result: accepted.result,
                        execution_time_ms: accepted.execution_time_ms,
                        tried_candidates: *tried,
                        response,
                        trace: None,
                    });
                }
                Ok(Attempt::Rejected { stage, reason }) => {
                    info!(
                        template_id = %candidate.template.id,
                        stage = ?stage,
                        reason = %reason,
                        "Candidate rejected, trying next"
                    );
                    entry.stage_reached = stage;
                    entry.rejection = Some(reason);
                    trace.push(entry);
                }
                Err(e) => {
                    entry.rejection = Some(e.to_string());
                    trace.push(entry);
                    return Err(e);
                }
            }
        }

        let message = if candidates.is_empty() {
            "No templates available for this query".to_string()
        } else {
            format!(
                "No template matched the query after trying {} of {} candidate(s)",
                *tried,
                candidates.len()
            )
        };
        info!(tried_candidates = *tried, "{}", message);
        Ok(QueryOutcome::Failure {
            error: ErrorKind::NoCandidateMatched,
            message,
            tried_candidates: *tried,
            trace: None,
        })
    }

    /// One candidate through Extracting..Executing.
    async fn attempt(
        &self,
        query: &str,
        snapshot: &LibrarySnapshot,
        candidate: &MatchCandidate,
        cancel: &CancellationToken,
        entry: &mut CandidateTrace,
    ) -> Result<Attempt> {
        let template = candidate.template.as_ref();

        entry.stage_reached = PipelineStage::Extracting;
        check_cancelled(cancel, PipelineStage::Extracting)?;
        let extracted = self
            .extractor
            .extract(query, template, &snapshot.domain, snapshot.strategy)
            .await;

        entry.stage_reached = PipelineStage::Validating;
        check_cancelled(cancel, PipelineStage::Validating)?;
        let report = ParameterValidator::validate(&extracted, template);
        if !report.ok {
            return Ok(Attempt::Rejected {
                stage: PipelineStage::Validating,
                reason: AppError::ValidationFailure(report.summary()).to_string(),
            });
        }
        let bound = ParameterValidator::bound_values(&extracted, template);

        if self.gate.is_enabled() {
            entry.stage_reached = PipelineStage::Verifying;
            let verdict = self.gate.verify(query, template, &bound).await;
            check_cancelled(cancel, PipelineStage::Verifying)?;
            if !verdict.should_proceed {
                return Ok(Attempt::Rejected {
                    stage: PipelineStage::Verifying,
                    reason: AppError::VerificationRejected(verdict.reason).to_string(),
                });
            }
        }

        entry.stage_reached = PipelineStage::Rendering;
        let rendered = TemplateProcessor::render(template, &snapshot.domain, &bound);

        check_cancelled(cancel, PipelineStage::Executing)?;
        entry.stage_reached = PipelineStage::Executing;
        let start = Instant::now();
        match self.executor.execute(&rendered.sql, &rendered.bind_params).await {
            Ok((statement, result)) => Ok(Attempt::Accepted(Accepted {
                parameters: bound,
                sql: statement.sql,
                result,
                execution_time_ms: start.elapsed().as_millis() as u64,
            })),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Attempt::Rejected {
                stage: PipelineStage::Executing,
                reason: e.to_string(),
            }),
        }
    }
}

fn check_cancelled(cancel: &CancellationToken, stage: PipelineStage) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled(format!(
            "Request cancelled before {:?}",
            stage
        )));
    }
    Ok(())
}
