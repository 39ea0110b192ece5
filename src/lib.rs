pub mod app;
pub mod assembly;
pub mod bundle;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod input;
pub mod manifest;
pub mod merge;
pub mod output;
pub mod probe;
pub mod schema;
pub mod store;
pub mod submission;
pub mod timestamp;
pub mod upload;
