//! Include/exclude glob filtering of logical tree paths.
//!
//! Patterns use shell semantics: `*` and `?` stop at `/`, `[...]` classes
//! and `\` escapes work as in a shell. `**` only spans directories when it
//! is a whole path component (`**/*.go`, `docs/**`), which is what
//! `globset` offers; there is no other recursive matching.

use crate::error::{ExtractError, Result};
use crate::pipeline::ExtractRequest;
use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// What to do with an exclude pattern that does not compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExcludeErrorPolicy {
    /// Drop the exclude, warn once, and keep every included file eligible.
    #[default]
    Ignore,
    /// Abort before traversal with a pattern error.
    FailFast,
}

/// Build a glob matcher with shell-like separator handling.
pub fn build_matcher(
    pattern: &str,
    case_insensitive: bool,
) -> std::result::Result<GlobMatcher, globset::Error> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .case_insensitive(case_insensitive)
        .build()
        .map(|g| g.compile_matcher())
}

/// Compiled include/exclude predicate.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    include: GlobMatcher,
    exclude: Option<GlobMatcher>,
}

impl PatternFilter {
    /// Case-sensitive filter; a malformed exclude is dropped with a warning.
    pub fn new(include: &str, exclude: Option<&str>) -> Result<Self> {
        Self::with_options(include, exclude, ExcludeErrorPolicy::default(), false)
    }

    pub fn with_options(
        include: &str,
        exclude: Option<&str>,
        exclude_policy: ExcludeErrorPolicy,
        case_insensitive: bool,
    ) -> Result<Self> {
        if include.is_empty() {
            return Err(ExtractError::Pattern(
                "include pattern must not be empty".to_string(),
            ));
        }
        let include = build_matcher(include, case_insensitive).map_err(|e| {
            ExtractError::Pattern(format!("invalid include pattern '{}': {}", include, e))
        })?;

        let exclude = match exclude.filter(|p| !p.is_empty()) {
            None => None,
            Some(raw) => match build_matcher(raw, case_insensitive) {
                Ok(matcher) => Some(matcher),
                Err(e) => match exclude_policy {
                    ExcludeErrorPolicy::FailFast => {
                        return Err(ExtractError::Pattern(format!(
                            "invalid exclude pattern '{}': {}",
                            raw, e
                        )));
                    }
                    ExcludeErrorPolicy::Ignore => {
                        warn!(pattern = %raw, error = %e, "Ignoring malformed exclude pattern");
                        None
                    }
                },
            },
        };

        Ok(Self { include, exclude })
    }

    pub fn from_request(request: &ExtractRequest) -> Result<Self> {
        Self::with_options(
            &request.include,
            request.exclude.as_deref(),
            request.exclude_error_policy,
            request.case_insensitive,
        )
    }

    /// Included iff the path matches the include and not the exclude.
    pub fn should_include(&self, path: &str) -> bool {
        if !self.include.is_match(path) {
            return false;
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(path),
            None => true,
        }
    }

    pub fn include_pattern(&self) -> &str {
        self.include.glob().glob()
    }

    pub fn exclude_pattern(&self) -> Option<&str> {
        self.exclude.as_ref().map(|m| m.glob().glob())
    }
}

/// One-shot form of [`PatternFilter::should_include`].
///
/// Compiles on every call, so prefer a `PatternFilter` in loops. A malformed
/// include matches nothing; a malformed exclude excludes nothing.
pub fn should_include(path: &str, include: &str, exclude: Option<&str>) -> bool {
    let Ok(include) = build_matcher(include, false) else {
        return false;
    };
    if !include.is_match(path) {
        return false;
    }
    match exclude.filter(|p| !p.is_empty()) {
        None => true,
        Some(raw) => match build_matcher(raw, false) {
            Ok(exclude) => !exclude.is_match(path),
            Err(_) => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_does_not_cross_directories() {
        assert!(should_include("a.txt", "*.txt", None));
        assert!(!should_include("a/b.txt", "*.txt", None));
        assert!(should_include("a/b.txt", "*/*.txt", None));
        assert!(!should_include("a/b.txt", "?/b.txt", Some("a/*")));
    }

    #[test]
    fn exclude_takes_precedence() {
        assert!(should_include("main.go", "*.go", Some("*_test.go")));
        assert!(!should_include("main_test.go", "*.go", Some("*_test.go")));
    }

    #[test]
    fn empty_exclude_means_unset() {
        let filter = PatternFilter::new("*.md", Some("")).unwrap();
        assert!(filter.exclude_pattern().is_none());
        assert!(filter.should_include("readme.md"));
    }

    #[test]
    fn double_star_component_spans_directories() {
        let filter = PatternFilter::new("**/*.go", Some("**/*_test.go")).unwrap();
        assert!(filter.should_include("main.go"));
        assert!(filter.should_include("src/main.go"));
        assert!(!filter.should_include("src/main_test.go"));
        assert!(!filter.should_include("image.png"));

        let everything = PatternFilter::new("**", None).unwrap();
        assert!(everything.should_include("deep/nested/file"));
    }

    #[test]
    fn character_classes_and_question_mark() {
        let filter = PatternFilter::new("file[0-9].?s", None).unwrap();
        assert!(filter.should_include("file1.rs"));
        assert!(filter.should_include("file7.js"));
        assert!(!filter.should_include("fileA.rs"));
        assert!(!filter.should_include("file1.tsx"));
    }

    #[test]
    fn malformed_include_is_rejected_up_front() {
        let err = PatternFilter::new("src/[", None).unwrap_err();
        assert!(matches!(err, ExtractError::Pattern(ref m) if m.contains("include")));

        let err = PatternFilter::new("", None).unwrap_err();
        assert!(matches!(err, ExtractError::Pattern(_)));
    }

    #[test]
    fn malformed_exclude_follows_policy() {
        let lenient = PatternFilter::new("*.go", Some("[")).unwrap();
        assert!(lenient.exclude_pattern().is_none());
        assert!(lenient.should_include("main_test.go"));

        let err =
            PatternFilter::with_options("*.go", Some("["), ExcludeErrorPolicy::FailFast, false)
                .unwrap_err();
        assert!(matches!(err, ExtractError::Pattern(ref m) if m.contains("exclude")));

        // The one-shot helper keeps the same fallback.
        assert!(should_include("main_test.go", "*.go", Some("[")));
        assert!(!should_include("main.go", "[", None));
    }

    #[test]
    fn case_insensitive_matching_is_opt_in() {
        let strict = PatternFilter::new("*.MD", None).unwrap();
        assert!(!strict.should_include("readme.md"));

        let relaxed =
            PatternFilter::with_options("*.MD", None, ExcludeErrorPolicy::Ignore, true).unwrap();
        assert!(relaxed.should_include("readme.md"));
    }
}
