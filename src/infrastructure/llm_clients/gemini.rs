use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: reqwest::Client,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn models_url(config: &LLMConfig) -> String {
        let base_url = config.base_url.trim_end_matches('/');
        if base_url.ends_with("/models") {
            base_url.to_string()
        } else {
            format!("{}/models", base_url)
        }
    }

    fn normalize_model(model: &str) -> &str {
        model.trim().trim_start_matches("models/")
    }

    fn api_key(config: &LLMConfig) -> Result<String> {
        config
            .api_key
            .clone()
            .ok_or_else(|| AppError::LLMError("Missing API key for Gemini provider".to_string()))
    }

    fn build_request(config: &LLMConfig, system: &str, user: &str) -> GeminiRequest {
        let system_instruction = (!system.trim().is_empty()).then(|| GeminiContent {
            parts: vec![GeminiPart {
                text: system.to_string(),
            }],
            role: None,
        });

        GeminiRequest {
            system_instruction,
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: user.to_string(),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: Some(GenerationConfig {
                temperature: config.temperature.unwrap_or(0.0) as f64,
                max_output_tokens: config.max_tokens,
            }),
        }
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(response: GeminiResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .map(|candidate| {
            candidate
                .content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<String>()
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))
}

#[async_trait]
impl LLMClient for GeminiClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let api_key = Self::api_key(config)?;
        let url = format!(
            "{}/{}:generateContent?key={}",
            Self::models_url(config),
            Self::normalize_model(&config.model),
            api_key
        );
        let body = Self::build_request(config, system, user);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let json: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        candidate_text(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_system_instruction() {
        let body = GeminiClient::build_request(&LLMConfig::default(), "be terse", "hello");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn test_models_url_and_model_name() {
        let mut config = LLMConfig::default();
        config.base_url = "https://generativelanguage.googleapis.com/v1beta/".to_string();
        assert_eq!(
            GeminiClient::models_url(&config),
            "https://generativelanguage.googleapis.com/v1beta/models"
        );
        assert_eq!(GeminiClient::normalize_model(" models/gemini-1.5-flash"), "gemini-1.5-flash");
    }

    #[test]
    fn test_candidate_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"should_proceed\": "}, {"text": "true}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(candidate_text(response).unwrap(), "{\"should_proceed\": true}");
        let empty: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert!(candidate_text(empty).is_err());
    }
}
