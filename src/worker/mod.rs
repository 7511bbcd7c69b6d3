pub mod adapter;
pub mod commands;
pub mod source;
