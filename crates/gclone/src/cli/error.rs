//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use gclone_extract::GIT_BIN_ENV;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Local repository or directory does not exist
    pub fn source_not_found(source: &str) -> Self {
        Self::new(format!("Source not found: {}", source))
            .with_context("The repository path does not exist on the filesystem")
            .with_suggestions([
                format!("TRY: Check that the path exists: ls -la {}", source),
                "TRY: Pass a remote URL with --repo to clone instead".to_string(),
            ])
    }

    /// A git command failed (clone, rev-parse, ls-tree)
    pub fn git_failed(source: &str, details: &str) -> Self {
        Self::new(format!("Cannot read git source: {}", source))
            .with_context(details.to_string())
            .with_suggestions([
                "TRY: Check that git is installed: git --version".to_string(),
                format!("TRY: Point {} at a specific git executable", GIT_BIN_ENV),
                "TRY: Check the URL and your network access, or the --rev value".to_string(),
            ])
    }

    /// Include or exclude glob does not compile
    pub fn invalid_pattern(details: &str) -> Self {
        Self::new(format!("Invalid glob pattern: {}", details))
            .with_context("Patterns use shell glob syntax; '*' does not cross '/'")
            .with_suggestions([
                "TRY: Use '**/*.go' to match files in every directory".to_string(),
                "TRY: Close character classes: '[abc]'".to_string(),
                "TRY: Drop --strict-exclude to skip a broken exclude pattern".to_string(),
            ])
    }

    /// Configuration file or flags are invalid
    pub fn invalid_config(details: &str) -> Self {
        Self::new(format!("Invalid configuration: {}", details))
            .with_suggestions([
                "TRY: Check the TOML syntax of your config file".to_string(),
                "TRY: --workers must be at least 1".to_string(),
            ])
    }

    /// Output directory cannot be created
    pub fn output_root(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot create output directory: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                format!(
                    "TRY: Check permissions of the parent directory: ls -la {}",
                    path.parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| ".".to_string())
                ),
                "TRY: Choose another location with --outdir".to_string(),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While extracting")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While extracting"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_source_not_found() {
        let display = HelpfulError::source_not_found("/nonexistent/repo").to_string();
        assert!(display.contains("/nonexistent/repo"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_git_failed_mentions_override() {
        let display =
            HelpfulError::git_failed("https://example.com/r", "exit status 128").to_string();
        assert!(display.contains("CONTEXT: exit status 128"));
        assert!(display.contains(GIT_BIN_ENV));
    }

    #[test]
    fn test_output_root_suggests_parent() {
        let err = HelpfulError::output_root(&PathBuf::from("/readonly/out"), "Permission denied");
        let display = err.to_string();
        assert!(display.contains("ls -la /readonly"));
        assert!(display.contains("Permission denied"));
    }
}
