//! In-memory collaborators shared by the use-case tests.

use crate::application::use_cases::query_executor::{RunError, SqlParam, SqlRunner};
use crate::application::use_cases::template_library::EmbeddingOracle;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::outcome::QueryResult;
use crate::infrastructure::llm_clients::LLMClient;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const FAKE_DIM: usize = 16;

/// Embeds known texts to fixed vectors and anything else to a word-hash vector.
#[derive(Default)]
pub struct FakeEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingOracle for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::LLMError("embedding backend unavailable".to_string()));
        }
        if let Some(v) = self.vectors.get(text) {
            return Ok(v.clone());
        }
        let mut v = vec![0.0; FAKE_DIM];
        for word in text.to_lowercase().split_whitespace() {
            let slot = word.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31) + b as usize);
            v[slot % FAKE_DIM] += 1.0;
        }
        Ok(v)
    }
}

/// Returns scripted responses in order; errors once the script runs out.
#[derive(Default)]
pub struct FakeLlm {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn scripted(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for FakeLlm {
    async fn generate(&self, _config: &LLMConfig, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::LLMError("no scripted response".to_string())))
    }
}

/// Records every statement and replies from a queue, defaulting to one row.
#[derive(Default)]
pub struct FakeRunner {
    replies: Mutex<VecDeque<std::result::Result<QueryResult, RunError>>>,
    pub calls: Mutex<Vec<(String, Vec<SqlParam>)>>,
}

impl FakeRunner {
    pub fn replying(replies: Vec<std::result::Result<QueryResult, RunError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Bound values of the `index`th call, without their types.
    pub fn values(&self, index: usize) -> Vec<Value> {
        self.calls.lock().unwrap()[index]
            .1
            .iter()
            .map(|p| p.value.clone())
            .collect()
    }
}

#[async_trait]
impl SqlRunner for FakeRunner {
    async fn run(&self, sql: &str, params: &[SqlParam]) -> std::result::Result<QueryResult, RunError> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(QueryResult::new(
                vec!["ok".to_string()],
                vec![vec![Value::Bool(true)]],
            ))
        })
    }
}
