pub mod app;
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use app::{build_pipeline, init_tracing, run};
