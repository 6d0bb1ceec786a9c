//! Subcommand implementations

pub mod pods;
pub mod recommendations;
pub mod stats;
