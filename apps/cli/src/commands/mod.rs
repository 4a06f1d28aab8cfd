//! Command implementations for the Forge CLI.

pub mod cleanup;
pub mod config;
pub mod jobs;
pub mod models;
pub mod render;
pub mod run;
pub mod types;

pub use types::{ConfigCommand, ModelsCommand, RunArgs};
