//! Error types for extraction runs.
//!
//! Only setup and traversal failures live here. Per-file problems never
//! become an `ExtractError`; they are reported as `ExtractEvent::Failed`.

use gclone_sinks::SinkError;
use std::io;
use thiserror::Error;

/// Extraction error type
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Invalid tree entry: {0}")]
    InvalidEntry(String),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ExtractError>;
