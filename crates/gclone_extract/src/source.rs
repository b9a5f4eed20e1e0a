//! Resolve a user-supplied source string into a tree walker.

use crate::error::Result;
use crate::tree::{CloneOptions, DirTree, GitTree, TreeWalker, WalkErrorPolicy};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Where the files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeSource {
    /// Anything that is not a local directory; handed to `git clone`.
    Remote(String),
    /// Local git repository (work tree or bare).
    Repository(PathBuf),
    /// Plain directory, read as-is.
    Directory(PathBuf),
}

/// Knobs applied when opening a source.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Revision for local repositories, branch/tag for remote clones.
    pub rev: Option<String>,
    /// Clone depth for remotes; `None` is full history.
    pub depth: Option<u32>,
    pub walk_error_policy: WalkErrorPolicy,
}

/// An opened source ready to walk.
pub struct OpenedTree {
    pub walker: Box<dyn TreeWalker>,
    /// Commit being extracted, for git sources.
    pub commit: Option<String>,
}

impl TreeSource {
    pub fn parse(raw: &str) -> Self {
        let path = Path::new(raw);
        if path.is_dir() {
            if looks_like_git_repo(path) {
                TreeSource::Repository(path.to_path_buf())
            } else {
                TreeSource::Directory(path.to_path_buf())
            }
        } else {
            TreeSource::Remote(raw.to_string())
        }
    }

    pub fn open(&self, options: &SourceOptions) -> Result<OpenedTree> {
        match self {
            TreeSource::Remote(url) => {
                let clone = CloneOptions {
                    depth: options.depth,
                    branch: options.rev.clone(),
                };
                let tree = GitTree::clone_remote(url, &clone)?
                    .with_error_policy(options.walk_error_policy);
                Ok(OpenedTree {
                    commit: Some(tree.commit().to_string()),
                    walker: Box::new(tree),
                })
            }
            TreeSource::Repository(path) => {
                let rev = options.rev.as_deref().unwrap_or("HEAD");
                let tree = GitTree::open(path, rev)?.with_error_policy(options.walk_error_policy);
                Ok(OpenedTree {
                    commit: Some(tree.commit().to_string()),
                    walker: Box::new(tree),
                })
            }
            TreeSource::Directory(path) => {
                if let Some(rev) = &options.rev {
                    warn!(
                        rev = %rev,
                        path = %path.display(),
                        "Ignoring revision for a plain directory"
                    );
                }
                let tree = DirTree::new(path)?.with_error_policy(options.walk_error_policy);
                Ok(OpenedTree {
                    commit: None,
                    walker: Box::new(tree),
                })
            }
        }
    }
}

impl fmt::Display for TreeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeSource::Remote(url) => write!(f, "{}", url),
            TreeSource::Repository(path) => write!(f, "git repository {}", path.display()),
            TreeSource::Directory(path) => write!(f, "directory {}", path.display()),
        }
    }
}

/// Work tree (`.git` entry) or bare layout (`HEAD` file + `objects/`).
fn looks_like_git_repo(path: &Path) -> bool {
    path.join(".git").exists() || (path.join("HEAD").is_file() && path.join("objects").is_dir())
}
