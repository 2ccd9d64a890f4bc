pub mod use_cases;

pub use use_cases::intent_pipeline::{IntentPipeline, PipelineConfig, PipelineContext};
