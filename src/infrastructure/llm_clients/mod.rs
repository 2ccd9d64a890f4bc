pub mod gemini;
pub mod openai;

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use async_trait::async_trait;
use gemini::GeminiClient;
use openai::OpenAIClient;
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String>;
}

/// Dispatches on `config.provider`. Every call is bounded by `config.timeout_secs`.
pub struct RouterClient {
    openai: OpenAIClient,
    gemini: GeminiClient,
}

impl Default for RouterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            openai: OpenAIClient::new(),
            gemini: GeminiClient::new(),
        }
    }
}

async fn with_timeout<T>(config: &LLMConfig, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(config.timeout_secs), call)
        .await
        .map_err(|_| {
            AppError::LLMError(format!(
                "Model call timed out after {}s",
                config.timeout_secs
            ))
        })?
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        match config.provider {
            LLMProvider::Gemini => with_timeout(config, self.gemini.generate(config, system, user)).await,
            _ => with_timeout(config, self.openai.generate(config, system, user)).await,
        }
    }
}
