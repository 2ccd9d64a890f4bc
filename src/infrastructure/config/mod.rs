//! Gateway configuration.
//!
//! Layered with figment: built-in defaults, then the TOML file named by
//! `INTENT_GATEWAY_CONFIG` (or `intent-gateway.toml`), then `INTENT_*`
//! environment variables where `__` separates sections
//! (`INTENT_PIPELINE__TOP_K=8`). A `.env` file is read first.

use crate::application::use_cases::intent_pipeline::{
    PipelineConfig, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K,
};
use crate::application::use_cases::query_executor::DbType;
use crate::application::use_cases::response_formatter::{FormatterOptions, OutputFormat};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

pub const CONFIG_PATH_ENV: &str = "INTENT_GATEWAY_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "intent-gateway.toml";
pub const ENV_PREFIX: &str = "INTENT_";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineSettings {
    #[validate(range(min = 1, max = 100))]
    pub top_k: usize,
    #[validate(range(min = 1, max = 100))]
    pub max_candidates: Option<usize>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f32,
    pub debug_trace: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_candidates: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            debug_trace: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// One model call per missing required parameter.
    pub model_fallback: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            model_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub enabled: bool,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ResponseSettings {
    /// delimited | markdown | toon | csv
    pub format: String,
    #[validate(range(min = 1, max = 50))]
    pub max_summary_fields: usize,
    #[validate(range(min = 1, max = 10000))]
    pub max_table_rows: usize,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        let defaults = FormatterOptions::default();
        Self {
            format: defaults.format.as_str().to_string(),
            max_summary_fields: defaults.max_summary_fields,
            max_table_rows: defaults.max_table_rows,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    pub domain_path: PathBuf,
    pub template_paths: Vec<PathBuf>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            domain_path: PathBuf::from("config/domain.toml"),
            template_paths: vec![PathBuf::from("config/templates.toml")],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAI,
    Ollama,
    Gemini,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProvider::OpenAI => "openai",
            EmbeddingProvider::Ollama => "ollama",
            EmbeddingProvider::Gemini => "gemini",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    #[validate(length(min = 1))]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    pub api_key: Option<String>,
    /// Entries in the read-through cache; 0 disables it.
    pub cache_size: usize,
    pub cache_ttl_secs: u64,
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            cache_size: 1000,
            cache_ttl_secs: 3600,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseSettings {
    pub driver: DbType,
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub query_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            driver: DbType::Postgres,
            url: "postgres://localhost/postgres".to_string(),
            max_connections: 5,
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
            idle_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct GatewayConfig {
    #[validate(nested)]
    pub pipeline: PipelineSettings,
    pub extraction: ExtractionSettings,
    pub verification: VerificationSettings,
    #[validate(nested)]
    pub response: ResponseSettings,
    pub library: LibrarySettings,
    pub llm: LLMConfig,
    #[validate(nested)]
    pub embedding: EmbeddingSettings,
    #[validate(nested)]
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

impl GatewayConfig {
    /// Defaults, then `path` if it exists, then the environment.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(Some(&path)))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: GatewayConfig = figment
            .extract()
            .map_err(|e| AppError::ConfigurationError(format!("Invalid configuration: {}", e)))?;
        config
            .validate()
            .map_err(|e| AppError::ConfigurationError(format!("Invalid configuration: {}", e)))?;
        Ok(config)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            top_k: self.pipeline.top_k,
            max_candidates: self.pipeline.max_candidates,
            similarity_threshold: self.pipeline.similarity_threshold,
            debug_trace: self.pipeline.debug_trace,
            response: FormatterOptions {
                format: OutputFormat::parse(&self.response.format),
                max_summary_fields: self.response.max_summary_fields,
                max_table_rows: self.response.max_table_rows,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(GatewayConfig::default()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::from_figment(defaults()).unwrap();
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.top_k, 5);
        assert_eq!(pipeline.max_candidates(), 5);
        assert!((pipeline.similarity_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(pipeline.response.format, OutputFormat::Delimited);
        assert!(config.verification.enabled);
        assert!(config.extraction.model_fallback);
    }

    #[test]
    fn test_model_fallback_can_be_switched_off() {
        let figment = defaults().merge(Toml::string("[extraction]\nmodel_fallback = false"));
        let config = GatewayConfig::from_figment(figment).unwrap();
        assert!(!config.extraction.model_fallback);
    }

    #[test]
    fn test_toml_overrides_sections() {
        let figment = defaults().merge(Toml::string(
            r#"
            [pipeline]
            top_k = 8
            max_candidates = 3
            debug_trace = true

            [response]
            format = "markdown"

            [database]
            driver = "sqlite"
            url = "sqlite://gateway.db"

            [llm]
            provider = "gemini"
            base_url = "https://generativelanguage.googleapis.com/v1beta"
            model = "gemini-1.5-flash"
            "#,
        ));
        let config = GatewayConfig::from_figment(figment).unwrap();
        assert_eq!(config.pipeline.top_k, 8);
        assert_eq!(config.pipeline_config().max_candidates(), 3);
        assert_eq!(config.pipeline_config().response.format, OutputFormat::Markdown);
        assert_eq!(config.database.driver, DbType::Sqlite);
        assert_eq!(config.llm.model, "gemini-1.5-flash");
        assert_eq!(config.embedding.model, "nomic-embed-text");
    }

    #[test]
    fn test_out_of_range_is_configuration_error() {
        let figment = defaults().merge(Toml::string("[pipeline]\nsimilarity_threshold = 1.5"));
        assert!(matches!(
            GatewayConfig::from_figment(figment),
            Err(AppError::ConfigurationError(_))
        ));
        let figment = defaults().merge(Toml::string("[pipeline]\ntop_k = 0"));
        assert!(GatewayConfig::from_figment(figment).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let figment = defaults().merge(Toml::file("/nonexistent/intent-gateway.toml"));
        assert!(GatewayConfig::from_figment(figment).is_ok());
    }
}
