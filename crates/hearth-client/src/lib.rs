//! CLI, configuration and composition root
//!
//! This crate provides the `hearth` command-line interface.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;
pub mod secret;

pub use app::App;
pub use cli::Cli;
pub use error::{ClientError, ClientResult};
