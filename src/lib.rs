#![allow(clippy::async_fn_in_trait)]
pub mod common;
pub mod rest;
pub mod server;
pub mod traits;
pub mod worker;

pub use server::rest_server::management_server_start;
