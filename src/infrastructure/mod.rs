pub mod config;
pub mod db;
pub mod embedding;
pub mod llm_clients;
pub mod response;
