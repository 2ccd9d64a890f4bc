//! Parameter Validator
//!
//! Checks extracted values against the template's declarations: every
//! required parameter is present and every value coerces to its declared
//! type. All failures are collected into one report, and a passing run
//! yields the typed value map handed on to rendering.

use crate::application::use_cases::template_library::CompiledTemplate;
use crate::domain::outcome::ExtractionResult;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

pub struct ParameterValidator;

impl ParameterValidator {
    /// Check every declared parameter, collecting all failures.
    pub fn validate(extracted: &ExtractionResult, template: &CompiledTemplate) -> ValidationReport {
        let mut errors = Vec::new();

        for param in &template.parameters {
            match extracted.get(&param.name) {
                None => {
                    if param.required {
                        errors.push(format!("Missing required parameter '{}'", param.name));
                    }
                }
                Some(value) => {
                    if param.value_type.coerce(value).is_none() {
                        errors.push(format!(
                            "Parameter '{}' value {} is not a valid {}",
                            param.name, value, param.value_type
                        ));
                    }
                }
            }
        }

        ValidationReport {
            ok: errors.is_empty(),
            errors,
        }
    }

    /// Declared-type values for binding, nulls for missing parameters.
    /// Only meaningful after `validate` reported ok.
    pub fn bound_values(
        extracted: &ExtractionResult,
        template: &CompiledTemplate,
    ) -> BTreeMap<String, Value> {
        template
            .parameters
            .iter()
            .map(|param| {
                let value = extracted
                    .get(&param.name)
                    .and_then(|v| param.value_type.coerce(v))
                    .unwrap_or(Value::Null);
                (param.name.clone(), value)
            })
            .collect()
    }
}
