//! Verification Gate
//!
//! Asks the language model whether a matched template, with the values
//! extracted for it, really answers the user's question. A negative verdict
//! is an ordinary signal to try the next candidate. Model failures and
//! replies that cannot be parsed count as rejections.

use crate::application::use_cases::template_library::CompiledTemplate;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::outcome::VerificationVerdict;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::json_payload;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You review database query plans. Given a user's question, a query \
template's intent and the values extracted from the question, decide whether running the \
template with those values answers the question. Respond with JSON only: \
{\"should_proceed\": true|false, \"reason\": \"short explanation\"}";

#[derive(Debug, Deserialize)]
struct VerdictResponse {
    should_proceed: bool,
    #[serde(default)]
    reason: String,
}

pub struct VerificationGate {
    llm: Option<Arc<dyn LLMClient>>,
    config: LLMConfig,
    enabled: bool,
}

impl VerificationGate {
    pub fn new(llm: Arc<dyn LLMClient>, config: LLMConfig) -> Self {
        Self {
            llm: Some(llm),
            config,
            enabled: true,
        }
    }

    /// A gate that lets every candidate through.
    pub fn disabled() -> Self {
        Self {
            llm: None,
            config: LLMConfig::default(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.llm.is_some()
    }

    pub async fn verify(
        &self,
        query: &str,
        template: &CompiledTemplate,
        parameters: &BTreeMap<String, Value>,
    ) -> VerificationVerdict {
        let llm = match (&self.llm, self.enabled) {
            (Some(llm), true) => llm,
            _ => return VerificationVerdict::proceed("verification disabled"),
        };

        let prompt = build_verification_prompt(query, template, parameters);
        let verdict = match llm.generate(&self.config, SYSTEM_PROMPT, &prompt).await {
            Ok(response) => parse_verdict(&response).unwrap_or_else(|e| {
                warn!(template_id = %template.id, error = %e, "Unparseable verification reply");
                VerificationVerdict::reject(format!("Unparseable verification response: {}", e))
            }),
            Err(e) => {
                warn!(template_id = %template.id, error = %e, "Verification call failed");
                VerificationVerdict::reject(format!("Verification unavailable: {}", e))
            }
        };

        debug!(
            template_id = %template.id,
            proceed = verdict.should_proceed,
            reason = %verdict.reason,
            "Verification verdict"
        );
        verdict
    }
}

fn build_verification_prompt(
    query: &str,
    template: &CompiledTemplate,
    parameters: &BTreeMap<String, Value>,
) -> String {
    let mut prompt = format!(
        "User question: {}\n\nTemplate: {}\nIntent: {}\n",
        query, template.id, template.description
    );
    if let Some(example) = template.nl_examples.first() {
        prompt.push_str(&format!("Example question: {}\n", example));
    }

    prompt.push_str("\nExtracted values:\n");
    if template.parameters.is_empty() {
        prompt.push_str("- (none)\n");
    }
    for param in &template.parameters {
        let value = parameters
            .get(&param.name)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(not provided)".to_string());
        prompt.push_str(&format!(
            "- {} ({}, {}): {}\n",
            param.name,
            param.describe(),
            param.value_type,
            value
        ));
    }

    prompt.push_str("\nShould this template be executed for the question?");
    prompt
}

/// Parse `{"should_proceed": bool, "reason": string}` out of a model reply.
pub fn parse_verdict(response: &str) -> Result<VerificationVerdict> {
    let payload = json_payload(response).ok_or_else(|| {
        AppError::ParseError("No JSON object in verification response".to_string())
    })?;
    let parsed: VerdictResponse = serde_json::from_str(&payload).map_err(|e| {
        AppError::ParseError(format!("Failed to parse verification response as JSON: {}", e))
    })?;
    Ok(VerificationVerdict {
        should_proceed: parsed.should_proceed,
        reason: parsed.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::template_library::compile_template;
    use crate::application::use_cases::test_support::FakeLlm;
    use crate::domain::domain_model::tests::healthcare_definition;
    use crate::domain::domain_model::DomainModel;
    use serde_json::json;

    fn template() -> CompiledTemplate {
        let domain = DomainModel::from_definition(healthcare_definition()).unwrap();
        let def = serde_json::from_value(json!({
            "id": "find_by_id",
            "description": "Find a {{primary_entity}} by medical record number",
            "sql_template": "SELECT 1",
            "parameters": [{"name": "patient_id", "entity": "patient", "field": "patient_id", "required": true}]
        }))
        .unwrap();
        compile_template(def, &domain, 0).unwrap()
    }

    #[test]
    fn test_parse_plain_json() {
        let verdict = parse_verdict(r#"{"should_proceed": true, "reason": "matches"}"#).unwrap();
        assert!(verdict.should_proceed);
        assert_eq!(verdict.reason, "matches");
    }

    #[test]
    fn test_parse_fenced_with_think() {
        let response = "<think>the user asks about visits</think>\n```json\n{\"should_proceed\": false, \"reason\": \"wrong entity\"}\n```";
        let verdict = parse_verdict(response).unwrap();
        assert!(!verdict.should_proceed);
        assert_eq!(verdict.reason, "wrong entity");
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_verdict("yes, go ahead").is_err());
        assert!(parse_verdict(r#"{"proceed": "maybe"}"#).is_err());
    }

    #[tokio::test]
    async fn test_prompt_carries_intent_and_values() {
        let llm = Arc::new(FakeLlm::scripted(vec![Ok(
            r#"{"should_proceed": true, "reason": "ok"}"#.to_string(),
        )]));
        let gate = VerificationGate::new(llm.clone(), LLMConfig::default());
        let params = BTreeMap::from([("patient_id".to_string(), json!("123456"))]);
        let verdict = gate.verify("Find patient MRN 123456", &template(), &params).await;
        assert!(verdict.should_proceed);
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Find a Patient by medical record number"));
        assert!(prompt.contains("\"123456\""));
    }

    #[tokio::test]
    async fn test_model_error_is_rejection() {
        let llm = Arc::new(FakeLlm::scripted(vec![Err(AppError::LLMError("503".into()))]));
        let gate = VerificationGate::new(llm, LLMConfig::default());
        let verdict = gate.verify("q", &template(), &BTreeMap::new()).await;
        assert!(!verdict.should_proceed);
        assert!(verdict.reason.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_disabled_gate_always_proceeds() {
        let gate = VerificationGate::disabled();
        assert!(!gate.is_enabled());
        let verdict = gate.verify("q", &template(), &BTreeMap::new()).await;
        assert!(verdict.should_proceed);
    }
}
