//! Subcommand implementations.

pub mod auth;
pub mod calendar;
pub mod daemon;
pub mod status;
pub mod sync;
pub mod today;
