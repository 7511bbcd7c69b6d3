pub mod node_config;
pub mod query_engine;
