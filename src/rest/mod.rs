pub mod data_sources;
pub mod nodes;
pub mod storages;
