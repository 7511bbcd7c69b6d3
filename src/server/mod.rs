pub mod auth;
pub mod node;
pub mod node_client;
pub mod registry;
pub mod rest_server;
