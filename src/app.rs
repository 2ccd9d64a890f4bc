use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::application::use_cases::intent_pipeline::{IntentPipeline, PipelineContext};
use crate::application::use_cases::template_library::TemplateLibrary;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::GatewayConfig;
use crate::infrastructure::db::build_runner;
use crate::infrastructure::embedding::build_embedder;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so stdout stays JSON.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Wire every collaborator named in `config` into a ready pipeline.
pub async fn build_pipeline(config: &GatewayConfig) -> Result<IntentPipeline> {
    let embedder = build_embedder(&config.embedding)?;
    let library = TemplateLibrary::load_from_paths(
        &config.library.domain_path,
        &config.library.template_paths.iter().collect::<Vec<_>>(),
        Arc::clone(&embedder),
    )
    .await?;
    let (runner, db_type) = build_runner(&config.database).await?;

    let needs_model = config.verification.enabled || config.extraction.model_fallback;
    let llm: Option<Arc<dyn LLMClient>> = if needs_model {
        Some(Arc::new(RouterClient::new()))
    } else {
        None
    };

    let ctx = PipelineContext {
        library: Arc::new(library),
        embedder,
        llm,
        llm_config: config.llm.clone(),
        runner,
        db_type,
        model_fallback: config.extraction.model_fallback,
        verification_enabled: config.verification.enabled,
    };
    let pipeline = IntentPipeline::new(ctx, config.pipeline_config());
    info!(
        templates = pipeline.library().snapshot()?.len(),
        driver = ?db_type,
        "Intent gateway ready"
    );
    Ok(pipeline)
}

/// Completes on Ctrl-C. If the handler cannot be installed it never completes.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn answer(pipeline: &IntentPipeline, query: &str) -> Result<()> {
    let outcome = pipeline.resolve_until(query, ctrl_c()).await;
    let line = serde_json::to_string(&outcome)
        .map_err(|e| AppError::Internal(format!("Failed to serialize outcome: {}", e)))?;
    println!("{}", line);
    Ok(())
}

/// Resolve the query given on the command line, or one query per stdin line.
pub async fn run() -> Result<()> {
    let config = GatewayConfig::load()?;
    init_tracing(&config.logging.filter);

    let pipeline = match build_pipeline(&config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to start intent gateway");
            return Err(e);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return answer(&pipeline, &args.join(" ")).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        answer(&pipeline, query).await?;
    }
    Ok(())
}
