//! Parameter Extractor
//!
//! Pulls a value for each declared template parameter out of the query text.
//! Strategies are tried in order and the first hit wins:
//! 1. the semantic type's regex patterns, then its name patterns, then the
//!    domain strategy's built-in extractor for that type
//! 2. the field's own extraction pattern
//! 3. the field's extraction hints: quoted text, a capitalized span, a
//!    number, a relative term, a listed date format
//! 4. the domain strategy's by-name extractor
//! 5. one model call, for required parameters only
//!
//! Missing values are not errors here; the validator decides.

use crate::application::use_cases::domain_strategy::DomainStrategy;
use crate::application::use_cases::template_library::CompiledTemplate;
use crate::domain::domain_model::{CompiledField, DomainModel};
use crate::domain::llm_config::LLMConfig;
use crate::domain::outcome::{ExtractedValue, ExtractionResult, ExtractionSource};
use crate::domain::query_template::ParameterSpec;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::clean_llm_response;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap());

static CAPITALIZED_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b").unwrap());

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+[\d,]*\b").unwrap());

/// Date formats a field may list under `extraction_hints.formats`.
static HINT_DATE_FORMATS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("YYYY-MM-DD", r"\b(\d{4}-\d{2}-\d{2})\b"),
        ("DD-MM-YYYY", r"\b(\d{2}-\d{2}-\d{4})\b"),
        ("MM/DD/YYYY", r"\b(\d{2}/\d{2}/\d{4})\b"),
        (
            "Month DD, YYYY",
            r"(?i)\b((?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4})\b",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

const MODEL_NO_VALUE: &[&str] = &["none", "null", "n/a", "unknown", ""];

const FALLBACK_SYSTEM_PROMPT: &str = "You extract one parameter value from a user's question. \
Reply with the value only, exactly as it should be used in a database query. \
If the question does not contain the value, reply with NONE.";

fn regex_value(re: &Regex, query: &str) -> Option<String> {
    re.captures(query).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

pub struct ParameterExtractor {
    llm: Option<Arc<dyn LLMClient>>,
    llm_config: LLMConfig,
    model_fallback: bool,
}

impl ParameterExtractor {
    pub fn new(llm: Option<Arc<dyn LLMClient>>, llm_config: LLMConfig, model_fallback: bool) -> Self {
        Self {
            llm,
            llm_config,
            model_fallback,
        }
    }

    /// Pattern-only extractor.
    pub fn without_model() -> Self {
        Self::new(None, LLMConfig::default(), false)
    }

    pub async fn extract(
        &self,
        query: &str,
        template: &CompiledTemplate,
        domain: &DomainModel,
        strategy: DomainStrategy,
    ) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        for param in &template.parameters {
            let field = match (&param.entity, &param.field) {
                (Some(entity), Some(field)) => domain.field(entity, field),
                _ => None,
            };

            let mut found = Self::extract_from_text(query, param, field, domain, strategy)
                .map(|(raw, source)| ExtractedValue {
                    value: param
                        .value_type
                        .parse_text(&raw)
                        .unwrap_or(Value::String(raw)),
                    source,
                });

            if found.is_none() && param.required && self.model_fallback {
                found = self.extract_with_model(query, param).await.map(|raw| ExtractedValue {
                    value: Value::String(raw),
                    source: ExtractionSource::ModelFallback,
                });
            }

            if found.is_none() {
                found = param.default.clone().filter(|v| !v.is_null()).map(|value| ExtractedValue {
                    value,
                    source: ExtractionSource::Default,
                });
            }

            debug!(
                template_id = %template.id,
                parameter = %param.name,
                source = ?found.as_ref().map(|f| f.source),
                "Parameter extraction"
            );
            result.values.insert(param.name.clone(), found);
        }

        result
    }

    /// Steps 1 to 4: everything that works on the query text alone.
    fn extract_from_text(
        query: &str,
        param: &ParameterSpec,
        field: Option<&CompiledField>,
        domain: &DomainModel,
        strategy: DomainStrategy,
    ) -> Option<(String, ExtractionSource)> {
        let semantic_type = param
            .semantic_type
            .as_deref()
            .or_else(|| field.and_then(|f| f.def.semantic_type.as_deref()));

        if let Some(st_id) = semantic_type {
            if let Some(st) = domain.semantic_type(st_id) {
                for re in st.regex_patterns.iter().chain(st.name_patterns.iter()) {
                    if let Some(value) = regex_value(re, query) {
                        return Some((value, ExtractionSource::RegexMatch));
                    }
                }
            }
            if let Some(value) = strategy.extract_builtin(st_id, query, param) {
                return Some((value, ExtractionSource::Builtin));
            }
        }

        if let Some(found) = field.and_then(|f| Self::extract_from_field(query, f)) {
            return Some(found);
        }

        strategy
            .extract_by_parameter_name(query, param)
            .map(|value| (value, ExtractionSource::Builtin))
    }

    /// Steps 2 and 3: the field's pattern, then its hints.
    fn extract_from_field(query: &str, field: &CompiledField) -> Option<(String, ExtractionSource)> {
        if let Some(value) = field.pattern.as_ref().and_then(|re| regex_value(re, query)) {
            return Some((value, ExtractionSource::RegexMatch));
        }

        let hints = field.def.extraction_hints.as_ref()?;
        if hints.look_for_quotes {
            if let Some(caps) = QUOTED.captures(query) {
                if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                    return Some((m.as_str().to_string(), ExtractionSource::Hint));
                }
            }
        }
        if hints.capitalization_required {
            if let Some(caps) = CAPITALIZED_SPAN.captures(query) {
                return Some((caps[1].to_string(), ExtractionSource::Hint));
            }
        }
        if hints.numeric_required {
            if let Some(m) = NUMBER.find(query) {
                return Some((m.as_str().to_string(), ExtractionSource::Hint));
            }
        }
        let lower = query.to_lowercase();
        if let Some(term) = hints
            .relative_terms
            .iter()
            .find(|term| lower.contains(&term.to_lowercase()))
        {
            return Some((term.clone(), ExtractionSource::Hint));
        }
        for format in &hints.formats {
            let Some((_, re)) = HINT_DATE_FORMATS.iter().find(|(name, _)| name == format) else {
                continue;
            };
            if let Some(value) = regex_value(re, query) {
                return Some((value, ExtractionSource::Hint));
            }
        }
        None
    }

    async fn extract_with_model(&self, query: &str, param: &ParameterSpec) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let user_prompt = format!(
            "Question: {}\nParameter: {}\nDescription: {}\nExpected type: {}",
            query,
            param.name,
            param.describe(),
            param.value_type
        );

        match llm
            .generate(&self.llm_config, FALLBACK_SYSTEM_PROMPT, &user_prompt)
            .await
        {
            Ok(response) => {
                let cleaned = clean_llm_response(&response);
                let value = cleaned.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
                if MODEL_NO_VALUE.contains(&value.to_lowercase().as_str()) {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            Err(e) => {
                warn!(parameter = %param.name, error = %e, "Model fallback extraction failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::template_library::compile_template;
    use crate::application::use_cases::test_support::FakeLlm;
    use crate::domain::domain_model::tests::healthcare_definition;
    use crate::domain::domain_model::DomainDefinition;
    use crate::domain::error::AppError;
    use serde_json::json;

    fn setup(params: Value) -> (DomainModel, CompiledTemplate) {
        setup_with(healthcare_definition(), params)
    }

    fn setup_with(definition: DomainDefinition, params: Value) -> (DomainModel, CompiledTemplate) {
        let domain = DomainModel::from_definition(definition).unwrap();
        let def = serde_json::from_value(json!({
            "id": "t",
            "description": "test",
            "sql_template": "SELECT 1",
            "parameters": params
        }))
        .unwrap();
        let template = compile_template(def, &domain, 0).unwrap();
        (domain, template)
    }

    #[tokio::test]
    async fn test_semantic_regex_capture() {
        let (domain, template) = setup(json!([
            {"name": "patient_id", "entity": "patient", "field": "patient_id", "type": "string", "required": true}
        ]));
        let result = ParameterExtractor::without_model()
            .extract("Find patient MRN 123456", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(result.get("patient_id"), Some(&json!("123456")));
        assert_eq!(result.source("patient_id"), Some(ExtractionSource::RegexMatch));
    }

    #[tokio::test]
    async fn test_name_pattern_fallback() {
        let (domain, template) = setup(json!([
            {"name": "patient_id", "entity": "patient", "field": "patient_id", "required": true}
        ]));
        let result = ParameterExtractor::without_model()
            .extract("look up patient id: A77", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(result.get("patient_id"), Some(&json!("A77")));
    }

    #[tokio::test]
    async fn test_quote_and_capitalization_hints() {
        let (domain, template) = setup(json!([
            {"name": "full_name", "entity": "patient", "field": "full_name"}
        ]));
        let extractor = ParameterExtractor::without_model();
        let quoted = extractor
            .extract("records for 'jane doe'", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(quoted.get("full_name"), Some(&json!("jane doe")));
        let capitalized = extractor
            .extract("records for Jane Doe please", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(capitalized.get("full_name"), Some(&json!("Jane Doe")));
    }

    #[tokio::test]
    async fn test_date_coerced_to_declared_type() {
        let (domain, template) = setup(json!([
            {"name": "since", "entity": "visit", "field": "visit_date", "type": "date", "semantic_type": "date_value"}
        ]));
        let result = ParameterExtractor::without_model()
            .extract("visits since March 5th, 2024", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(result.get("since"), Some(&json!("2024-03-05")));
        assert_eq!(result.source("since"), Some(ExtractionSource::Builtin));
    }

    #[tokio::test]
    async fn test_missing_optional_is_null_and_default_applies() {
        let (domain, template) = setup(json!([
            {"name": "since", "entity": "visit", "field": "visit_date", "type": "date"},
            {"name": "limit", "type": "int", "default": 10}
        ]));
        let result = ParameterExtractor::without_model()
            .extract("all visits", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(result.get("since"), None);
        assert!(result.values.contains_key("since"));
        assert_eq!(result.get("limit"), Some(&json!(10)));
        assert_eq!(result.source("limit"), Some(ExtractionSource::Default));
    }

    #[tokio::test]
    async fn test_model_fallback_only_for_required() {
        let (domain, template) = setup(json!([
            {"name": "diagnosis", "entity": "visit", "field": "diagnosis_code", "required": true},
            {"name": "note", "type": "string"}
        ]));
        let llm = Arc::new(FakeLlm::scripted(vec![Ok("<think>x</think> E11.9 ".to_string())]));
        let extractor = ParameterExtractor::new(Some(llm.clone()), LLMConfig::default(), true);
        let result = extractor
            .extract("the sugar one", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(result.get("diagnosis"), Some(&json!("E11.9")));
        assert_eq!(result.source("diagnosis"), Some(ExtractionSource::ModelFallback));
        assert_eq!(result.get("note"), None);
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_yields_null() {
        let (domain, template) = setup(json!([
            {"name": "diagnosis", "entity": "visit", "field": "diagnosis_code", "required": true}
        ]));
        let llm = Arc::new(FakeLlm::scripted(vec![Err(AppError::LLMError("timeout".into()))]));
        let extractor = ParameterExtractor::new(Some(llm), LLMConfig::default(), true);
        let result = extractor
            .extract("the sugar one", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(result.get("diagnosis"), None);
    }

    fn orders_definition() -> DomainDefinition {
        serde_json::from_value(json!({
            "domain_name": "shop",
            "strategy": "customer_order",
            "entities": {"order": {"table_name": "orders", "role": "primary"}},
            "fields": {
                "order": [
                    {"name": "order_id", "data_type": "string", "extraction_pattern": "ref\\s+(\\d+)"},
                    {"name": "units", "data_type": "int", "extraction_hints": {"numeric_required": true}},
                    {"name": "window", "data_type": "string",
                     "extraction_hints": {"relative_terms": ["last week", "this month"]}},
                    {"name": "placed_on", "data_type": "date",
                     "extraction_hints": {"formats": ["DD-MM-YYYY"]}}
                ]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_field_pattern_runs_before_name_based_extraction() {
        let (domain, template) = setup_with(
            orders_definition(),
            json!([
                {"name": "order_id", "entity": "order", "field": "order_id", "required": true},
                {"name": "other_order_id"}
            ]),
        );
        let result = ParameterExtractor::without_model()
            .extract("order 555 ref 777", &template, &domain, DomainStrategy::CustomerOrder)
            .await;
        assert_eq!(result.get("order_id"), Some(&json!("777")));
        assert_eq!(result.source("order_id"), Some(ExtractionSource::RegexMatch));
        assert_eq!(result.get("other_order_id"), Some(&json!("555")));
        assert_eq!(result.source("other_order_id"), Some(ExtractionSource::Builtin));
    }

    #[tokio::test]
    async fn test_no_builtin_without_semantic_type_under_generic() {
        let (domain, template) = setup_with(
            orders_definition(),
            json!([{"name": "order_id", "entity": "order", "field": "order_id"}]),
        );
        let result = ParameterExtractor::without_model()
            .extract("where is order 555", &template, &domain, DomainStrategy::Generic)
            .await;
        assert_eq!(result.get("order_id"), None);
    }

    #[tokio::test]
    async fn test_numeric_relative_and_format_hints() {
        let (domain, template) = setup_with(
            orders_definition(),
            json!([
                {"name": "units", "entity": "order", "field": "units", "type": "int"},
                {"name": "window", "entity": "order", "field": "window"},
                {"name": "placed_on", "entity": "order", "field": "placed_on", "type": "date"}
            ]),
        );
        let result = ParameterExtractor::without_model()
            .extract(
                "orders of 1,200 units placed 05-03-2024 during Last Week",
                &template,
                &domain,
                DomainStrategy::Generic,
            )
            .await;
        assert_eq!(result.get("units"), Some(&json!(1200)));
        assert_eq!(result.get("window"), Some(&json!("last week")));
        assert_eq!(result.get("placed_on"), Some(&json!("2024-03-05")));
        assert_eq!(result.source("placed_on"), Some(ExtractionSource::Hint));
    }
}
