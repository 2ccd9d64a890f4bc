pub mod domain_model;
pub mod error;
pub mod llm_config;
pub mod outcome;
pub mod query_template;
pub mod value_type;
