//! Domain Model
//!
//! Describes the entities, fields, semantic types and extraction rules of one
//! business domain. A `DomainDefinition` is the authored (serde) form; a
//! `DomainModel` is the validated form with every regex compiled, built once
//! per library load and never mutated afterwards.

use crate::domain::error::{AppError, Result};
use crate::domain::value_type::ValueType;
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityRole {
    Primary,
    Secondary,
    #[default]
    Related,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDef {
    pub table_name: String,
    #[serde(default)]
    pub role: EntityRole,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticTypeDef {
    /// Keywords that precede a value, e.g. `mrn` matches "MRN: 123456".
    #[serde(default)]
    pub name_patterns: Vec<String>,
    /// Regexes whose first capture group (or whole match) is the value.
    #[serde(default)]
    pub regex_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionHints {
    #[serde(default)]
    pub look_for_quotes: bool,
    #[serde(default)]
    pub capitalization_required: bool,
    #[serde(default)]
    pub numeric_required: bool,
    /// Phrases taken verbatim when present, e.g. "last week".
    #[serde(default)]
    pub relative_terms: Vec<String>,
    /// One or more of `YYYY-MM-DD`, `DD-MM-YYYY`, `MM/DD/YYYY`, `Month DD, YYYY`.
    #[serde(default)]
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub data_type: ValueType,
    #[serde(default)]
    pub semantic_type: Option<String>,
    #[serde(default)]
    pub summary_priority: Option<i32>,
    #[serde(default)]
    pub extraction_pattern: Option<String>,
    #[serde(default)]
    pub extraction_hints: Option<ExtractionHints>,
    #[serde(default)]
    pub description: Option<String>,
    /// `currency`, `percentage` or `date`; other values leave cells as returned.
    #[serde(default)]
    pub display_format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub entity_synonyms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub action_verbs: BTreeMap<String, Vec<String>>,
}

/// Authored form of a domain, as read from a JSON or TOML definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainDefinition {
    pub domain_name: String,
    /// Domain strategy variant; `generic` when omitted.
    #[serde(default)]
    pub strategy: Option<String>,
    pub entities: BTreeMap<String, EntityDef>,
    #[serde(default)]
    pub semantic_types: BTreeMap<String, SemanticTypeDef>,
    /// Fields per entity. Both the entities and their fields keep authored order.
    #[serde(default)]
    pub fields: IndexMap<String, Vec<FieldDef>>,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

#[derive(Debug, Clone)]
pub struct CompiledSemanticType {
    pub id: String,
    pub regex_patterns: Vec<Regex>,
    pub name_patterns: Vec<Regex>,
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub entity: String,
    pub def: FieldDef,
    pub pattern: Option<Regex>,
    /// Position in the domain's overall field declaration order.
    pub declaration_index: usize,
}

/// Validated, immutable domain model.
#[derive(Debug, Clone)]
pub struct DomainModel {
    pub domain_name: String,
    pub strategy: String,
    pub entities: BTreeMap<String, EntityDef>,
    pub semantic_types: BTreeMap<String, CompiledSemanticType>,
    pub vocabulary: Vocabulary,
    fields: Vec<CompiledField>,
    field_index: HashMap<(String, String), usize>,
    primary: Option<String>,
    secondary: Option<String>,
}

pub(crate) fn compile_pattern(pattern: &str, owner: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            AppError::ExtractionFailure(format!(
                "Invalid extraction pattern '{}' for {}: {}",
                pattern, owner, e
            ))
        })
}

fn compile_name_pattern(keyword: &str, owner: &str) -> Result<Regex> {
    let pattern = format!(r"\b{}\b\s*[:=#]?\s*([^\s,]+)", regex::escape(keyword));
    compile_pattern(&pattern, owner)
}

impl DomainModel {
    pub fn from_definition(def: DomainDefinition) -> Result<Self> {
        if def.domain_name.trim().is_empty() {
            return Err(AppError::ConfigurationError(
                "Domain name must not be empty".to_string(),
            ));
        }

        let mut primary = None;
        let mut secondary = None;
        for (id, entity) in &def.entities {
            if entity.table_name.trim().is_empty() {
                return Err(AppError::ConfigurationError(format!(
                    "Entity '{}' has an empty table name",
                    id
                )));
            }
            match entity.role {
                EntityRole::Primary => {
                    if let Some(existing) = primary.replace(id.clone()) {
                        return Err(AppError::ConfigurationError(format!(
                            "Domain '{}' declares more than one primary entity ('{}', '{}')",
                            def.domain_name, existing, id
                        )));
                    }
                }
                EntityRole::Secondary => {
                    if let Some(existing) = secondary.replace(id.clone()) {
                        return Err(AppError::ConfigurationError(format!(
                            "Domain '{}' declares more than one secondary entity ('{}', '{}')",
                            def.domain_name, existing, id
                        )));
                    }
                }
                EntityRole::Related => {}
            }
        }

        let mut semantic_types = BTreeMap::new();
        for (id, st) in &def.semantic_types {
            let owner = format!("semantic type '{}'", id);
            let regex_patterns = st
                .regex_patterns
                .iter()
                .map(|p| compile_pattern(p, &owner))
                .collect::<Result<Vec<_>>>()?;
            let name_patterns = st
                .name_patterns
                .iter()
                .map(|p| compile_name_pattern(p, &owner))
                .collect::<Result<Vec<_>>>()?;
            semantic_types.insert(
                id.clone(),
                CompiledSemanticType {
                    id: id.clone(),
                    regex_patterns,
                    name_patterns,
                },
            );
        }

        // Primary first, then secondary, then the rest as authored; this is
        // the declaration order the formatter falls back to.
        let mut entity_order: Vec<&String> = def.fields.keys().collect();
        entity_order.sort_by_key(|id| match def.entities.get(*id).map(|e| e.role) {
            Some(EntityRole::Primary) => 0,
            Some(EntityRole::Secondary) => 1,
            _ => 2,
        });

        let mut fields = Vec::new();
        let mut field_index = HashMap::new();
        for entity_id in entity_order {
            if !def.entities.contains_key(entity_id) {
                return Err(AppError::ConfigurationError(format!(
                    "Fields declared for unknown entity '{}'",
                    entity_id
                )));
            }
            for field in &def.fields[entity_id] {
                if let Some(st) = &field.semantic_type {
                    if !semantic_types.contains_key(st) {
                        return Err(AppError::ConfigurationError(format!(
                            "Field '{}.{}' references unknown semantic type '{}'",
                            entity_id, field.name, st
                        )));
                    }
                }
                let pattern = match &field.extraction_pattern {
                    Some(p) => Some(compile_pattern(
                        p,
                        &format!("field '{}.{}'", entity_id, field.name),
                    )?),
                    None => None,
                };
                let key = (entity_id.clone(), field.name.clone());
                if field_index.contains_key(&key) {
                    return Err(AppError::ConfigurationError(format!(
                        "Field '{}.{}' declared twice",
                        entity_id, field.name
                    )));
                }
                field_index.insert(key, fields.len());
                fields.push(CompiledField {
                    entity: entity_id.clone(),
                    def: field.clone(),
                    pattern,
                    declaration_index: fields.len(),
                });
            }
        }

        Ok(Self {
            domain_name: def.domain_name,
            strategy: def.strategy.unwrap_or_else(|| "generic".to_string()),
            entities: def.entities,
            semantic_types,
            vocabulary: def.vocabulary,
            fields,
            field_index,
            primary,
            secondary,
        })
    }

    pub fn field(&self, entity: &str, name: &str) -> Option<&CompiledField> {
        self.field_index
            .get(&(entity.to_string(), name.to_string()))
            .map(|&idx| &self.fields[idx])
    }

    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    /// First field (in declaration order) whose name matches a result column.
    pub fn field_for_column(&self, column: &str) -> Option<&CompiledField> {
        self.fields
            .iter()
            .find(|f| f.def.name.eq_ignore_ascii_case(column))
    }

    pub fn semantic_type(&self, id: &str) -> Option<&CompiledSemanticType> {
        self.semantic_types.get(id)
    }

    pub fn primary_entity(&self) -> Option<(&str, &EntityDef)> {
        self.primary
            .as_deref()
            .and_then(|id| self.entities.get(id).map(|e| (id, e)))
    }

    pub fn secondary_entity(&self) -> Option<(&str, &EntityDef)> {
        self.secondary
            .as_deref()
            .and_then(|id| self.entities.get(id).map(|e| (id, e)))
    }

    pub fn display_name(&self, entity_id: &str) -> String {
        self.entities
            .get(entity_id)
            .and_then(|e| e.display_name.clone())
            .unwrap_or_else(|| entity_id.replace('_', " "))
    }

    /// Entity id plus its configured synonyms.
    pub fn entity_terms(&self, entity_id: &str) -> Vec<String> {
        let mut terms = vec![entity_id.replace('_', " ")];
        if let Some(display) = self.entities.get(entity_id).and_then(|e| e.display_name.clone()) {
            terms.push(display);
        }
        if let Some(synonyms) = self.vocabulary.entity_synonyms.get(entity_id) {
            terms.extend(synonyms.iter().cloned());
        }
        terms
    }
}
