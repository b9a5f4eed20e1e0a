//! gclone extraction core
//!
//! Pulls the files matching a glob out of a versioned tree and writes them
//! under an output directory, using a fixed pool of writer threads.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ TreeWalker  │     │ PatternFilter │     │  dispatch   │     │  N workers   │
//! │ (git / dir) │────▶│ include minus │────▶│ bounded(0)  │────▶│ OutputSink   │
//! │             │     │   exclude     │     │ rendezvous  │     │   ::write    │
//! └─────────────┘     └───────────────┘     └─────────────┘     └──────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **FileDescriptor**: logical path plus lazily opened content
//! - **ExtractionPipeline**: runs the walk and the worker pool, returns an
//!   [`ExtractReport`] once every worker has finished
//! - **ExtractEvent**: one per written or failed file; failures never abort
//!   the run

pub mod cancel;
pub mod config;
pub mod error;
pub mod patterns;
pub mod pipeline;
pub mod source;
pub mod tree;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use config::ExtractConfig;
pub use error::{ExtractError, Result};
pub use patterns::{should_include, ExcludeErrorPolicy, PatternFilter};
pub use pipeline::{ExtractEvent, ExtractReport, ExtractRequest, ExtractionPipeline};
pub use source::{OpenedTree, SourceOptions, TreeSource};
pub use tree::{
    CloneOptions, ContentSource, DirTree, FileDescriptor, GitTree, MemoryTree, TreeWalker,
    WalkErrorPolicy, WalkSummary, GIT_BIN_ENV,
};
