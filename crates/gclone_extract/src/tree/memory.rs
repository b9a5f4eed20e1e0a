use super::{FileDescriptor, TreeWalker, WalkSummary};
use crate::error::Result;
use std::io::{self, Cursor, Read};
use std::ops::ControlFlow;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum MemoryEntry {
    File { path: String, data: Arc<[u8]> },
    Unreadable { path: String, reason: String },
}

/// In-memory tree. Entries are yielded in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    entries: Vec<MemoryEntry>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        self.entries.push(MemoryEntry::File {
            path: path.into(),
            data: Arc::from(data),
        });
        self
    }

    /// Add a file whose content fails to open with `reason`.
    pub fn with_unreadable(mut self, path: impl Into<String>, reason: impl Into<String>) -> Self {
        self.entries.push(MemoryEntry::Unreadable {
            path: path.into(),
            reason: reason.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TreeWalker for MemoryTree {
    fn for_each_file(
        &mut self,
        visit: &mut dyn FnMut(FileDescriptor) -> ControlFlow<()>,
    ) -> Result<WalkSummary> {
        let mut summary = WalkSummary::default();
        for entry in &self.entries {
            let descriptor = match entry {
                MemoryEntry::File { path, data } => {
                    let data = Arc::clone(data);
                    FileDescriptor::new(path.clone(), move || -> io::Result<Box<dyn Read + Send>> {
                        Ok(Box::new(Cursor::new(data)))
                    })
                }
                MemoryEntry::Unreadable { path, reason } => {
                    let reason = reason.clone();
                    FileDescriptor::new(path.clone(), move || -> io::Result<Box<dyn Read + Send>> {
                        Err(io::Error::new(io::ErrorKind::Other, reason))
                    })
                }
            };
            summary.files_visited += 1;
            if visit(descriptor).is_break() {
                break;
            }
        }
        Ok(summary)
    }

    fn describe(&self) -> String {
        format!("memory tree ({} entries)", self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_files_and_failures() {
        let mut tree = MemoryTree::new()
            .with_file("a.txt", "alpha")
            .with_unreadable("b.txt", "corrupt object");

        let mut opened = Vec::new();
        let summary = tree
            .for_each_file(&mut |descriptor| {
                let (path, content) = descriptor.into_parts();
                let result = content.open().map(|mut r| {
                    let mut s = String::new();
                    r.read_to_string(&mut s).unwrap();
                    s
                });
                opened.push((path, result.map_err(|e| e.to_string())));
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(summary.files_visited, 2);
        assert_eq!(opened[0], ("a.txt".to_string(), Ok("alpha".to_string())));
        assert_eq!(opened[1], ("b.txt".to_string(), Err("corrupt object".to_string())));
    }

    #[test]
    fn break_stops_the_walk() {
        let mut tree = MemoryTree::new().with_file("a", "1").with_file("b", "2");
        let summary = tree
            .for_each_file(&mut |_| ControlFlow::Break(()))
            .unwrap();
        assert_eq!(summary.files_visited, 1);
    }
}
