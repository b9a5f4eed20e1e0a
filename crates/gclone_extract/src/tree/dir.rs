//! Plain directory as a tree source.

use super::{note_entry_error, FileDescriptor, TreeWalker, WalkErrorPolicy, WalkSummary};
use crate::error::{ExtractError, Result};
use std::fs::File;
use std::io::{self, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Directory names never descended into.
const SKIPPED_DIR_NAMES: &[&str] = &[".git"];

/// Join path components with `/` regardless of platform.
fn normalize_path_to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Regular files below a local directory. Symlinks are not followed and
/// not emitted.
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
    error_policy: WalkErrorPolicy,
}

impl DirTree {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ExtractError::SourceNotFound(root.display().to_string()));
        }
        Ok(Self {
            root,
            error_policy: WalkErrorPolicy::default(),
        })
    }

    pub fn with_error_policy(mut self, policy: WalkErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TreeWalker for DirTree {
    fn for_each_file(
        &mut self,
        visit: &mut dyn FnMut(FileDescriptor) -> ControlFlow<()>,
    ) -> Result<WalkSummary> {
        let mut summary = WalkSummary::default();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry.depth() > 0
                    && SKIPPED_DIR_NAMES
                        .iter()
                        .any(|name| entry.file_name() == *name))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    note_entry_error(self.error_policy, e.into(), &mut summary)?;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let logical = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => normalize_path_to_forward_slashes(rel),
                Err(_) => {
                    let err = ExtractError::InvalidEntry(format!(
                        "{} is outside {}",
                        entry.path().display(),
                        self.root.display()
                    ));
                    note_entry_error(self.error_policy, err, &mut summary)?;
                    continue;
                }
            };

            summary.files_visited += 1;
            let full_path = entry.into_path();
            let descriptor =
                FileDescriptor::new(logical, move || -> io::Result<Box<dyn Read + Send>> {
                    Ok(Box::new(File::open(full_path)?))
                });
            if visit(descriptor).is_break() {
                debug!(root = %self.root.display(), "Directory walk stopped early");
                break;
            }
        }

        Ok(summary)
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}
