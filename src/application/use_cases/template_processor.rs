//! Template Processor
//!
//! Renders the final SQL for a matched template: conditional fragments are
//! kept or dropped against the domain context and the set of bound
//! parameters, `{{name}}` tokens are substituted, and `%(name)s` bind
//! placeholders are left for the executor. Literal parameter values never
//! enter the SQL text.

use crate::application::use_cases::query_executor::SqlParam;
use crate::application::use_cases::template_ast::RenderContext;
use crate::application::use_cases::template_library::CompiledTemplate;
use crate::domain::domain_model::DomainModel;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Names usable as `{{placeholder}}` in any template text.
pub const CONTEXT_PLACEHOLDERS: &[&str] = &[
    "primary_entity",
    "primary_table",
    "secondary_entity",
    "secondary_table",
    "domain_name",
];

/// Domain booleans usable in `{% if %}` besides parameter names.
pub const DOMAIN_CONDITIONS: &[&str] = &["has_primary_entity", "has_secondary_entity"];

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    /// Non-null values for the template's declared parameters, with their declared types.
    pub bind_params: BTreeMap<String, SqlParam>,
}

/// Context derived from the domain alone. Absent entities render as empty strings.
pub fn domain_context(domain: &DomainModel) -> RenderContext {
    let (primary_entity, primary_table) = match domain.primary_entity() {
        Some((id, entity)) => (domain.display_name(id), entity.table_name.clone()),
        None => (String::new(), String::new()),
    };
    let (secondary_entity, secondary_table) = match domain.secondary_entity() {
        Some((id, entity)) => (domain.display_name(id), entity.table_name.clone()),
        None => (String::new(), String::new()),
    };

    RenderContext::default()
        .with_value("primary_entity", primary_entity)
        .with_value("primary_table", primary_table)
        .with_value("secondary_entity", secondary_entity)
        .with_value("secondary_table", secondary_table)
        .with_value("domain_name", domain.domain_name.clone())
        .with_flag("has_primary_entity", domain.primary_entity().is_some())
        .with_flag("has_secondary_entity", domain.secondary_entity().is_some())
}

pub struct TemplateProcessor;

impl TemplateProcessor {
    pub fn render(
        template: &CompiledTemplate,
        domain: &DomainModel,
        bound: &BTreeMap<String, Value>,
    ) -> RenderedQuery {
        let mut ctx = domain_context(domain);
        let mut bind_params = BTreeMap::new();

        for param in &template.parameters {
            let value = bound.get(&param.name).filter(|v| !v.is_null());
            ctx.set_flag(param.name.clone(), value.is_some());
            if let Some(value) = value {
                bind_params.insert(
                    param.name.clone(),
                    SqlParam::new(value.clone(), param.value_type),
                );
            }
        }

        let sql = template.sql.render(&ctx);
        debug!(
            template_id = %template.id,
            bound = bind_params.len(),
            "Rendered template SQL"
        );
        RenderedQuery { sql, bind_params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::template_library::compile_template;
    use crate::domain::domain_model::tests::healthcare_definition;
    use crate::domain::query_template::TemplateDefinition;
    use serde_json::json;

    fn visits_template() -> TemplateDefinition {
        serde_json::from_value(json!({
            "id": "visits_for_patient",
            "description": "List visits for a {{primary_entity}}",
            "sql_template": "SELECT p.patient_id, p.full_name{% if has_secondary_entity %}, v.visit_date FROM {{primary_table}} p JOIN {{secondary_table}} v ON v.patient_id = p.patient_id{% endif %}{% if not has_secondary_entity %} FROM {{primary_table}} p{% endif %} WHERE p.patient_id = %(patient_id)s{% if since %} AND v.visit_date >= %(since)s{% endif %}",
            "parameters": [
                {"name": "patient_id", "entity": "patient", "field": "patient_id", "type": "string", "required": true},
                {"name": "since", "entity": "visit", "field": "visit_date", "type": "date"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_secondary_join_omitted_without_secondary_entity() {
        let mut def = healthcare_definition();
        def.entities.get_mut("visit").unwrap().role =
            crate::domain::domain_model::EntityRole::Related;
        let domain = DomainModel::from_definition(def).unwrap();
        let template = compile_template(visits_template(), &domain, 0).unwrap();

        let bound = BTreeMap::from([("patient_id".to_string(), json!("123456"))]);
        let rendered = TemplateProcessor::render(&template, &domain, &bound);
        assert_eq!(
            rendered.sql,
            "SELECT p.patient_id, p.full_name FROM patients p WHERE p.patient_id = %(patient_id)s"
        );
        assert!(!rendered.sql.contains("JOIN"));
    }

    #[test]
    fn test_renders_join_and_optional_filter() {
        let domain = DomainModel::from_definition(healthcare_definition()).unwrap();
        let template = compile_template(visits_template(), &domain, 0).unwrap();
        let bound = BTreeMap::from([
            ("patient_id".to_string(), json!("123456")),
            ("since".to_string(), json!("2024-01-01")),
        ]);
        let rendered = TemplateProcessor::render(&template, &domain, &bound);
        assert!(rendered.sql.contains("JOIN visits v"));
        assert!(rendered.sql.ends_with("AND v.visit_date >= %(since)s"));
        assert_eq!(rendered.bind_params.len(), 2);
        assert_eq!(
            rendered.bind_params["since"].value_type,
            crate::domain::value_type::ValueType::Date
        );
        assert!(!rendered.sql.contains("123456"));
    }

    #[test]
    fn test_null_parameter_drops_block_and_binding() {
        let domain = DomainModel::from_definition(healthcare_definition()).unwrap();
        let template = compile_template(visits_template(), &domain, 0).unwrap();
        let bound = BTreeMap::from([
            ("patient_id".to_string(), json!("123456")),
            ("since".to_string(), Value::Null),
        ]);
        let rendered = TemplateProcessor::render(&template, &domain, &bound);
        assert!(!rendered.sql.contains("%(since)s"));
        assert!(!rendered.bind_params.contains_key("since"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let domain = DomainModel::from_definition(healthcare_definition()).unwrap();
        let template = compile_template(visits_template(), &domain, 0).unwrap();
        let bound = BTreeMap::from([("patient_id".to_string(), json!("1"))]);
        let a = TemplateProcessor::render(&template, &domain, &bound);
        let b = TemplateProcessor::render(&template, &domain, &bound);
        assert_eq!(a, b);
    }
}
