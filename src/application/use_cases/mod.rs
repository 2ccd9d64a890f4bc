pub mod domain_strategy;
pub mod intent_pipeline;
pub mod parameter_extractor;
pub mod parameter_validator;
pub mod query_executor;
pub mod response_formatter;
pub mod template_ast;
pub mod template_library;
pub mod template_matcher;
pub mod template_processor;
pub mod verification_gate;

#[cfg(test)]
pub mod test_support;
