use crate::application::use_cases::template_library::EmbeddingOracle;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::{EmbeddingProvider, EmbeddingSettings};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingRequest<'a> {
    content: GeminiEmbeddingContent<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingContent<'a> {
    parts: Vec<GeminiEmbeddingPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingResult,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResult {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Remote embedding service speaking the OpenAI, Ollama or Gemini protocol.
pub struct HttpEmbeddingClient {
    client: Client,
    settings: EmbeddingSettings,
}

impl HttpEmbeddingClient {
    pub fn new(settings: EmbeddingSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.settings.provider
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn resolve_gemini_embedding_model(model: &str) -> String {
        let trimmed = model.trim().trim_start_matches("models/");
        if trimmed.contains("embedding") {
            trimmed.to_string()
        } else {
            "text-embedding-004".to_string()
        }
    }

    fn openai_url(&self) -> String {
        format!("{}/embeddings", self.settings.base_url.trim_end_matches('/'))
    }

    fn ollama_url(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{}/api/embeddings", base)
    }

    fn gemini_url(&self) -> Result<String> {
        let api_key = self.settings.api_key.as_deref().ok_or_else(|| {
            AppError::ConfigurationError("Missing API key for Gemini embeddings".to_string())
        })?;
        let mut base_url = self.settings.base_url.trim_end_matches('/').to_string();
        if !base_url.ends_with("/models") {
            base_url = format!("{}/models", base_url);
        }
        let model_id = Self::resolve_gemini_embedding_model(&self.settings.model);
        Ok(format!("{}/{}:embedContent?key={}", base_url, model_id, api_key))
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, url: &str, body: &B) -> Result<R> {
        let mut req = self.client.post(url);
        if self.settings.provider == EmbeddingProvider::OpenAI {
            if let Some(api_key) = &self.settings.api_key {
                req = req.bearer_auth(api_key);
            }
        }

        let response = req
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ConnectionError(format!("Failed to call embedding API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ConnectionError(format!(
                "Embedding API returned error {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ParseError(format!("Failed to parse embedding response: {}", e)))
    }
}

#[async_trait]
impl EmbeddingOracle for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.settings.model.as_str();
        let embedding = match self.settings.provider {
            EmbeddingProvider::OpenAI => {
                let request = OpenAIEmbeddingRequest { model, input: text };
                let response: OpenAIEmbeddingResponse = self.post(&self.openai_url(), &request).await?;
                response
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .unwrap_or_default()
            }
            EmbeddingProvider::Ollama => {
                let request = OllamaEmbeddingRequest { model, prompt: text };
                let response: OllamaEmbeddingResponse = self.post(&self.ollama_url(), &request).await?;
                response.embedding
            }
            EmbeddingProvider::Gemini => {
                let request = GeminiEmbeddingRequest {
                    content: GeminiEmbeddingContent {
                        parts: vec![GeminiEmbeddingPart { text }],
                    },
                };
                let response: GeminiEmbeddingResponse = self.post(&self.gemini_url()?, &request).await?;
                response.embedding.values
            }
        };

        if embedding.is_empty() {
            return Err(AppError::ParseError("Empty embedding response".to_string()));
        }
        debug!(provider = ?self.settings.provider, dims = embedding.len(), "Embedded text");
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(provider: EmbeddingProvider, base_url: &str) -> HttpEmbeddingClient {
        HttpEmbeddingClient::new(EmbeddingSettings {
            provider,
            base_url: base_url.to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: Some("k".to_string()),
            ..EmbeddingSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_ollama_url_strips_openai_suffix() {
        let c = client(EmbeddingProvider::Ollama, "http://localhost:11434/v1/");
        assert_eq!(c.ollama_url(), "http://localhost:11434/api/embeddings");
    }

    #[test]
    fn test_openai_url() {
        let c = client(EmbeddingProvider::OpenAI, "https://api.openai.com/v1/");
        assert_eq!(c.openai_url(), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn test_gemini_model_defaults_to_embedding_model() {
        let c = client(
            EmbeddingProvider::Gemini,
            "https://generativelanguage.googleapis.com/v1beta",
        );
        assert_eq!(
            c.gemini_url().unwrap(),
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent?key=k"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_connection_error() {
        let c = client(EmbeddingProvider::Ollama, "http://127.0.0.1:9");
        let err = c.embed("hello").await.unwrap_err();
        assert!(matches!(err, AppError::ConnectionError(_)));
    }
}
