//! Tree sources: anything that can enumerate leaf files with lazily
//! readable content.
//!
//! A walker hands out [`FileDescriptor`]s one at a time. Order is
//! unspecified and consumers must not depend on it. Each leaf file is
//! visited exactly once per walk.

mod dir;
mod git;
mod memory;

pub use dir::DirTree;
pub use git::{CloneOptions, GitTree, GIT_BIN_ENV};
pub use memory::MemoryTree;

use crate::error::Result;
use std::fmt;
use std::io::{self, Read};
use std::ops::ControlFlow;
use tracing::warn;

/// Lazily opened byte content of a tree file.
pub trait ContentSource: Send {
    fn open(self: Box<Self>) -> io::Result<Box<dyn Read + Send>>;
}

impl<F> ContentSource for F
where
    F: FnOnce() -> io::Result<Box<dyn Read + Send>> + Send,
{
    fn open(self: Box<Self>) -> io::Result<Box<dyn Read + Send>> {
        (*self)()
    }
}

/// A leaf file produced by a walk: logical path plus content handle.
pub struct FileDescriptor {
    path: String,
    content: Box<dyn ContentSource>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>, content: impl ContentSource + 'static) -> Self {
        Self {
            path: path.into(),
            content: Box::new(content),
        }
    }

    /// Logical `/`-separated path relative to the tree root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn into_parts(self) -> (String, Box<dyn ContentSource>) {
        (self.path, self.content)
    }
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// How a walker reacts to a single bad entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkErrorPolicy {
    /// Log a warning, count it, keep walking.
    #[default]
    Continue,
    /// Stop the walk and return the error.
    Halt,
}

/// Counters reported by a finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub files_visited: u64,
    pub errors: u64,
}

/// A finite, non-restartable, unordered source of leaf files.
pub trait TreeWalker: Send {
    /// Feed every leaf file to `visit` until the tree is exhausted or
    /// `visit` breaks.
    ///
    /// An `Err` means the tree itself could not be read. Entry-level
    /// problems are handled per the walker's [`WalkErrorPolicy`].
    fn for_each_file(
        &mut self,
        visit: &mut dyn FnMut(FileDescriptor) -> ControlFlow<()>,
    ) -> Result<WalkSummary>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

impl<T: TreeWalker + ?Sized> TreeWalker for Box<T> {
    fn for_each_file(
        &mut self,
        visit: &mut dyn FnMut(FileDescriptor) -> ControlFlow<()>,
    ) -> Result<WalkSummary> {
        (**self).for_each_file(visit)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Apply `policy` to an entry-level error.
pub(crate) fn note_entry_error(
    policy: WalkErrorPolicy,
    error: crate::ExtractError,
    summary: &mut WalkSummary,
) -> Result<()> {
    summary.errors += 1;
    match policy {
        WalkErrorPolicy::Continue => {
            warn!(error = %error, "Skipping unreadable tree entry");
            Ok(())
        }
        WalkErrorPolicy::Halt => Err(error),
    }
}
