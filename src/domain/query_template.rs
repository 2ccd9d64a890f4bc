use crate::domain::value_type::ValueType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A declared template parameter bound to a domain field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(rename = "type", alias = "data_type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub semantic_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Authored template, as it appears in a library file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub semantic_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub nl_examples: Vec<String>,
    #[serde(alias = "sql")]
    pub sql_template: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Optional precomputed vector; computed from the embedding text when absent.
    #[serde(default)]
    pub embedding_vector: Option<Vec<f32>>,
}

/// A library file holds either a bare list of templates or a `templates` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TemplateFile {
    Wrapped { templates: Vec<TemplateDefinition> },
    List(Vec<TemplateDefinition>),
}

impl TemplateFile {
    pub fn into_templates(self) -> Vec<TemplateDefinition> {
        match self {
            TemplateFile::Wrapped { templates } => templates,
            TemplateFile::List(templates) => templates,
        }
    }
}

impl ParameterSpec {
    /// Human-facing description used in model prompts.
    pub fn describe(&self) -> String {
        match (&self.description, &self.entity, &self.field) {
            (Some(desc), _, _) => desc.clone(),
            (None, Some(entity), Some(field)) => format!("{} of the {}", field.replace('_', " "), entity),
            _ => self.name.replace('_', " "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_wrapped_and_bare_lists() {
        let wrapped = r#"{"templates": [{"id": "a", "description": "d", "sql": "SELECT 1"}]}"#;
        let bare = r#"[{"id": "a", "description": "d", "sql_template": "SELECT 1"}]"#;
        let a: TemplateFile = serde_json::from_str(wrapped).unwrap();
        let b: TemplateFile = serde_json::from_str(bare).unwrap();
        assert_eq!(a.into_templates()[0].sql_template, "SELECT 1");
        assert_eq!(b.into_templates()[0].id, "a");
    }

    #[test]
    fn test_parameter_type_aliases() {
        let json = r#"{"name": "days", "data_type": "integer", "required": true}"#;
        let spec: ParameterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.value_type, ValueType::Int);
        assert!(spec.default.is_none());
        assert_eq!(spec.describe(), "days");
    }
}
