//! Configuration for extraction runs

use crate::error::{ExtractError, Result};
use crate::patterns::ExcludeErrorPolicy;
use crate::pipeline::ExtractRequest;
use crate::source::SourceOptions;
use crate::tree::WalkErrorPolicy;
use gclone_sinks::OverwritePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Defaults for `gclone`, usually read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Number of writer threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Output directory for extracted files
    #[serde(default = "default_outdir")]
    pub outdir: String,

    /// Exclude pattern applied when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,

    /// Give up on a single file after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_timeout_secs: Option<u64>,

    /// Replace files that already exist in the output directory
    #[serde(default)]
    pub overwrite: bool,

    /// Treat a malformed exclude pattern as a fatal error
    #[serde(default)]
    pub fail_on_bad_exclude: bool,

    /// Stop at the first unreadable tree entry
    #[serde(default)]
    pub halt_on_walk_error: bool,

    #[serde(default)]
    pub case_insensitive: bool,

    /// History depth for remote clones (0 = full history)
    #[serde(default = "default_depth")]
    pub depth: u32,
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

fn default_outdir() -> String {
    "_gclone".to_string()
}

fn default_depth() -> u32 {
    1
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            outdir: default_outdir(),
            exclude: None,
            file_timeout_secs: None,
            overwrite: false,
            fail_on_bad_exclude: false,
            halt_on_walk_error: false,
            case_insensitive: false,
            depth: default_depth(),
        }
    }
}

impl ExtractConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ExtractConfig = toml::from_str(&content)
            .map_err(|e| ExtractError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Build the run request. An explicit `exclude` wins over the configured one.
    pub fn to_request(&self, include: &str, exclude: Option<&str>) -> ExtractRequest {
        ExtractRequest {
            include: include.to_string(),
            exclude: exclude
                .map(str::to_string)
                .or_else(|| self.exclude.clone()),
            workers: self.workers,
            file_timeout: self.file_timeout_secs.map(Duration::from_secs),
            exclude_error_policy: if self.fail_on_bad_exclude {
                ExcludeErrorPolicy::FailFast
            } else {
                ExcludeErrorPolicy::Ignore
            },
            case_insensitive: self.case_insensitive,
        }
    }

    pub fn source_options(&self, rev: Option<&str>) -> SourceOptions {
        SourceOptions {
            rev: rev.map(str::to_string),
            depth: (self.depth > 0).then_some(self.depth),
            walk_error_policy: if self.halt_on_walk_error {
                WalkErrorPolicy::Halt
            } else {
                WalkErrorPolicy::Continue
            },
        }
    }

    pub fn overwrite_policy(&self) -> OverwritePolicy {
        if self.overwrite {
            OverwritePolicy::Replace
        } else {
            OverwritePolicy::Refuse
        }
    }
}
