//! CLI command implementations

pub mod clone;
pub mod config;
pub mod error;
pub mod output;
