//! Template Library
//!
//! Loads authored templates against a domain model, resolves their
//! `{{placeholder}}` tokens, parses their SQL into a template AST and indexes
//! their embeddings. The active set is held as an immutable snapshot behind an
//! `Arc`; reload builds a complete new snapshot and swaps it in, so readers see
//! either the old set or the new one.

use crate::application::use_cases::domain_strategy::{DomainStrategy, StrategyRegistry};
use crate::application::use_cases::template_ast::TemplateAst;
use crate::application::use_cases::template_processor::{
    domain_context, CONTEXT_PLACEHOLDERS, DOMAIN_CONDITIONS,
};
use crate::domain::domain_model::{DomainDefinition, DomainModel};
use crate::domain::error::{AppError, Result};
use crate::domain::query_template::{ParameterSpec, TemplateDefinition, TemplateFile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

static BIND_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%\(([A-Za-z_][A-Za-z0-9_]*)\)s").unwrap());

/// Text-to-vector oracle used for templates at load time and queries at match time.
#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Nearest-neighbour lookup over template embeddings.
pub trait VectorIndex: Send + Sync {
    /// Up to `top_k` `(template_id, similarity)` pairs, best first.
    fn nearest(&self, vector: &[f32], top_k: usize) -> Vec<(String, f32)>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type IndexFactory = Arc<dyn Fn(&[Arc<CompiledTemplate>]) -> Arc<dyn VectorIndex> + Send + Sync>;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Exhaustive cosine index; ties keep library order.
pub struct CosineIndex {
    entries: Vec<(String, Vec<f32>)>,
}

impl CosineIndex {
    pub fn new(templates: &[Arc<CompiledTemplate>]) -> Self {
        Self {
            entries: templates
                .iter()
                .map(|t| (t.id.clone(), t.embedding.clone()))
                .collect(),
        }
    }
}

impl VectorIndex for CosineIndex {
    fn nearest(&self, vector: &[f32], top_k: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, (_, emb))| (idx, cosine_similarity(vector, emb)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| (self.entries[idx].0.clone(), score))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub fn cosine_index_factory() -> IndexFactory {
    Arc::new(|templates: &[Arc<CompiledTemplate>]| {
        Arc::new(CosineIndex::new(templates)) as Arc<dyn VectorIndex>
    })
}

/// A template resolved against a domain, ready for matching and rendering.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub semantic_tags: BTreeMap<String, String>,
    pub nl_examples: Vec<String>,
    pub parameters: Vec<ParameterSpec>,
    pub sql: TemplateAst,
    pub sql_source: String,
    pub embedding_text: String,
    pub embedding: Vec<f32>,
    /// Insertion order within the library, used for tie-breaks.
    pub position: usize,
}

impl CompiledTemplate {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

fn resolve_text(text: &str, domain: &DomainModel, what: &str) -> Result<String> {
    let ast = TemplateAst::parse(text)
        .map_err(|e| AppError::ConfigurationError(format!("{}: {}", what, e)))?;
    let placeholders: HashSet<&str> = CONTEXT_PLACEHOLDERS.iter().copied().collect();
    let conditions: HashSet<&str> = DOMAIN_CONDITIONS.iter().copied().collect();
    ast.check_names(&placeholders, &conditions)
        .map_err(|e| AppError::ConfigurationError(format!("{}: {}", what, e)))?;
    Ok(ast.render(&domain_context(domain)))
}

fn embedding_text(template: &CompiledTemplate, domain: &DomainModel) -> String {
    let mut parts = vec![template.description.clone()];
    parts.extend(template.nl_examples.iter().cloned());
    if !template.tags.is_empty() {
        parts.push(template.tags.join(" "));
    }
    if !template.parameters.is_empty() {
        let names: Vec<String> = template
            .parameters
            .iter()
            .map(|p| p.name.replace('_', " "))
            .collect();
        parts.push(names.join(" "));
    }
    for (key, value) in &template.semantic_tags {
        parts.push(format!("{} {}", key.replace('_', " "), value.replace('_', " ")));
    }
    if let Some(entity) = template.semantic_tags.get("primary_entity") {
        if let Some(synonyms) = domain.vocabulary.entity_synonyms.get(entity) {
            parts.push(synonyms.join(" "));
        }
    }
    parts.join("\n")
}

/// Resolve one authored template against `domain`. The embedding is filled in
/// from the definition when present and left empty otherwise.
pub fn compile_template(
    def: TemplateDefinition,
    domain: &DomainModel,
    position: usize,
) -> Result<CompiledTemplate> {
    if def.id.trim().is_empty() {
        return Err(AppError::ConfigurationError(format!(
            "Template at position {} has an empty id",
            position
        )));
    }
    let what = |field: &str| format!("template '{}' {}", def.id, field);

    let mut seen = HashSet::new();
    for param in &def.parameters {
        if !seen.insert(param.name.as_str()) {
            return Err(AppError::ConfigurationError(format!(
                "{} declares parameter '{}' twice",
                what("parameters"),
                param.name
            )));
        }
        if DOMAIN_CONDITIONS.contains(&param.name.as_str()) {
            return Err(AppError::ConfigurationError(format!(
                "{} parameter '{}' shadows a domain condition",
                what("parameters"),
                param.name
            )));
        }
        match (&param.entity, &param.field) {
            (Some(entity), Some(field)) => {
                if !domain.entities.contains_key(entity) {
                    return Err(AppError::ConfigurationError(format!(
                        "{} parameter '{}' references unknown entity '{}'",
                        what("parameters"),
                        param.name,
                        entity
                    )));
                }
                if domain.field(entity, field).is_none() {
                    return Err(AppError::ConfigurationError(format!(
                        "{} parameter '{}' references unknown field '{}.{}'",
                        what("parameters"),
                        param.name,
                        entity,
                        field
                    )));
                }
            }
            (Some(entity), None) if !domain.entities.contains_key(entity) => {
                return Err(AppError::ConfigurationError(format!(
                    "{} parameter '{}' references unknown entity '{}'",
                    what("parameters"),
                    param.name,
                    entity
                )));
            }
            _ => {}
        }
    }

    let description = resolve_text(&def.description, domain, &what("description"))?;
    let tags = def
        .tags
        .iter()
        .map(|t| resolve_text(t, domain, &what("tags")))
        .collect::<Result<Vec<_>>>()?;
    let semantic_tags = def
        .semantic_tags
        .iter()
        .map(|(k, v)| -> Result<(String, String)> {
            Ok((k.clone(), resolve_text(v, domain, &what("semantic_tags"))?))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;
    let nl_examples = def
        .nl_examples
        .iter()
        .map(|e| resolve_text(e, domain, &what("nl_examples")))
        .collect::<Result<Vec<_>>>()?;

    let sql = TemplateAst::parse(&def.sql_template)
        .map_err(|e| AppError::ConfigurationError(format!("{}: {}", what("sql_template"), e)))?;
    let placeholders: HashSet<&str> = CONTEXT_PLACEHOLDERS.iter().copied().collect();
    let mut conditions: HashSet<&str> = DOMAIN_CONDITIONS.iter().copied().collect();
    conditions.extend(def.parameters.iter().map(|p| p.name.as_str()));
    sql.check_names(&placeholders, &conditions)
        .map_err(|e| AppError::ConfigurationError(format!("{}: {}", what("sql_template"), e)))?;

    for caps in BIND_PLACEHOLDER.captures_iter(&def.sql_template) {
        if !seen.contains(&caps[1]) {
            warn!(
                template_id = %def.id,
                placeholder = &caps[1],
                "Bind placeholder has no declared parameter"
            );
        }
    }

    let mut compiled = CompiledTemplate {
        id: def.id,
        description,
        tags,
        semantic_tags,
        nl_examples,
        parameters: def.parameters,
        sql,
        sql_source: def.sql_template,
        embedding_text: String::new(),
        embedding: def.embedding_vector.unwrap_or_default(),
        position,
    };
    compiled.embedding_text = embedding_text(&compiled, domain);
    Ok(compiled)
}

/// One immutable generation of the library.
pub struct LibrarySnapshot {
    pub domain: Arc<DomainModel>,
    pub strategy: DomainStrategy,
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    templates: Vec<Arc<CompiledTemplate>>,
    by_id: HashMap<String, usize>,
    index: Arc<dyn VectorIndex>,
}

impl LibrarySnapshot {
    pub fn templates(&self) -> &[Arc<CompiledTemplate>] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CompiledTemplate>> {
        self.by_id.get(id).map(|&idx| &self.templates[idx])
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

pub struct TemplateLibrary {
    current: RwLock<Arc<LibrarySnapshot>>,
    embedder: Arc<dyn EmbeddingOracle>,
    index_factory: IndexFactory,
}

impl TemplateLibrary {
    pub async fn load(
        domain: DomainDefinition,
        templates: Vec<TemplateDefinition>,
        embedder: Arc<dyn EmbeddingOracle>,
    ) -> Result<Self> {
        Self::load_with_index(domain, templates, embedder, cosine_index_factory()).await
    }

    pub async fn load_with_index(
        domain: DomainDefinition,
        templates: Vec<TemplateDefinition>,
        embedder: Arc<dyn EmbeddingOracle>,
        index_factory: IndexFactory,
    ) -> Result<Self> {
        let snapshot =
            build_snapshot(domain, templates, embedder.as_ref(), &index_factory, 1).await?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            embedder,
            index_factory,
        })
    }

    pub async fn load_from_paths<P: AsRef<Path>>(
        domain_path: P,
        template_paths: &[P],
        embedder: Arc<dyn EmbeddingOracle>,
    ) -> Result<Self> {
        let domain = read_domain_file(domain_path.as_ref())?;
        let templates = read_template_files(template_paths)?;
        Self::load(domain, templates, embedder).await
    }

    /// The active generation. Callers keep it for the duration of one request.
    pub fn snapshot(&self) -> Result<Arc<LibrarySnapshot>> {
        self.current
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| AppError::Internal("Template library lock poisoned".to_string()))
    }

    /// Build a new generation and swap it in. On failure the previous
    /// generation stays active and the error is returned.
    pub async fn reload(
        &self,
        domain: DomainDefinition,
        templates: Vec<TemplateDefinition>,
    ) -> Result<usize> {
        // Generation numbers are assigned under the write lock.
        let mut snapshot = match build_snapshot(
            domain,
            templates,
            self.embedder.as_ref(),
            &self.index_factory,
            0,
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Template library reload failed; keeping previous library");
                return Err(e);
            }
        };
        let count = snapshot.len();
        let mut guard = self
            .current
            .write()
            .map_err(|_| AppError::Internal("Template library lock poisoned".to_string()))?;
        snapshot.version = guard.version + 1;
        let version = snapshot.version;
        *guard = Arc::new(snapshot);
        info!(version, templates = count, "Template library reloaded");
        Ok(count)
    }

    pub async fn reload_from_paths<P: AsRef<Path>>(
        &self,
        domain_path: P,
        template_paths: &[P],
    ) -> Result<usize> {
        let domain = read_domain_file(domain_path.as_ref())?;
        let templates = read_template_files(template_paths)?;
        self.reload(domain, templates).await
    }
}

async fn build_snapshot(
    domain: DomainDefinition,
    templates: Vec<TemplateDefinition>,
    embedder: &dyn EmbeddingOracle,
    index_factory: &IndexFactory,
    version: u64,
) -> Result<LibrarySnapshot> {
    let domain = DomainModel::from_definition(domain)?;
    let strategy = StrategyRegistry::global().resolve(&domain.strategy)?;

    let mut compiled = Vec::with_capacity(templates.len());
    let mut by_id = HashMap::new();
    for (position, def) in templates.into_iter().enumerate() {
        let mut template = compile_template(def, &domain, position)?;
        if by_id.insert(template.id.clone(), position).is_some() {
            return Err(AppError::ConfigurationError(format!(
                "Duplicate template id '{}'",
                template.id
            )));
        }
        if template.embedding.is_empty() {
            template.embedding = embedder.embed(&template.embedding_text).await?;
        }
        compiled.push(Arc::new(template));
    }

    if let Some(first) = compiled.first() {
        let dim = first.embedding.len();
        if let Some(bad) = compiled.iter().find(|t| t.embedding.len() != dim) {
            return Err(AppError::ConfigurationError(format!(
                "Template '{}' embedding has dimension {}, expected {}",
                bad.id,
                bad.embedding.len(),
                dim
            )));
        }
    }

    let index = (index_factory.as_ref())(&compiled);
    info!(
        domain = %domain.domain_name,
        strategy = strategy.name(),
        templates = compiled.len(),
        version,
        "Template library loaded"
    );

    Ok(LibrarySnapshot {
        domain: Arc::new(domain),
        strategy,
        version,
        loaded_at: Utc::now(),
        templates: compiled,
        by_id,
        index,
    })
}

fn read_definition_text(path: &Path) -> Result<(String, bool)> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigurationError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    Ok((text, is_toml))
}

/// Domain definitions are JSON, or TOML when the extension says so.
pub fn read_domain_file(path: &Path) -> Result<DomainDefinition> {
    let (text, is_toml) = read_definition_text(path)?;
    let parsed = if is_toml {
        toml::from_str(&text).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        AppError::ConfigurationError(format!("Invalid domain file {}: {}", path.display(), e))
    })
}

/// Concatenate template files in the given order.
pub fn read_template_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<TemplateDefinition>> {
    let mut all = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let (text, is_toml) = read_definition_text(path)?;
        let parsed: std::result::Result<TemplateFile, String> = if is_toml {
            toml::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        };
        let file = parsed.map_err(|e| {
            AppError::ConfigurationError(format!(
                "Invalid template file {}: {}",
                path.display(),
                e
            ))
        })?;
        all.extend(file.into_templates());
    }
    Ok(all)
}
