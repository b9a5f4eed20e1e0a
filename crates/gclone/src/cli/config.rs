//! Configuration discovery for gclone
//!
//! Priority: `--config <path>`, then `$GCLONE_HOME/config.toml` if it
//! exists, then built-in defaults.

use crate::cli::error::HelpfulError;
use gclone_extract::{ExtractConfig, ExtractError};
use gclone_logging::gclone_home;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default config location: `<home>/config.toml`
pub fn default_config_path() -> PathBuf {
    gclone_home().join("config.toml")
}

/// Pick the config file to read, if any.
pub fn resolve_config_path(explicit: Option<&Path>, home: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let discovered = home.join("config.toml");
    discovered.is_file().then_some(discovered)
}

/// Load the effective configuration.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<ExtractConfig> {
    load_config_from(explicit, &gclone_home())
}

fn load_config_from(explicit: Option<&Path>, home: &Path) -> anyhow::Result<ExtractConfig> {
    let Some(path) = resolve_config_path(explicit, home) else {
        debug!("No config file, using defaults");
        return Ok(ExtractConfig::default());
    };
    if !path.is_file() {
        return Err(HelpfulError::new(format!("Config file not found: {}", path.display()))
            .with_suggestion(format!(
                "TRY: Create it or drop --config to use {}",
                default_config_path().display()
            ))
            .into());
    }

    debug!(path = %path.display(), "Loading config");
    ExtractConfig::load(&path).map_err(|e| match e {
        ExtractError::Config(msg) => anyhow::Error::new(HelpfulError::invalid_config(&msg)),
        other => anyhow::Error::new(other)
            .context(format!("Failed to read config file {}", path.display())),
    })
}
