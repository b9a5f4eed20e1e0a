//! Output sinks for gclone.
//!
//! A sink materializes files under a fixed output root. Every logical path
//! is checked with [`sanitize_relative_path`] before anything touches the
//! filesystem, and [`DirSink`] refuses to descend through a symlink that
//! already sits below the root, so no write can land outside it.
//!
//! # Write protocol
//!
//! ```text
//! <root>/<dir>/.gclone-XXXX.tmp   <- content streamed + fsync
//!        │
//!        └── rename ──▶ <root>/<dir>/<name>
//! ```
//!
//! The staged file is removed if anything fails before the rename, so a
//! failed write never leaves a truncated file behind.

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Sink error type
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsafe path '{path}': {reason}")]
    UnsafePath { path: String, reason: &'static str },

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Failed to create output root {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SinkError>;

/// Destination for extracted files.
///
/// One sink value is shared by every extraction worker, so implementations
/// must tolerate concurrent `write` calls for distinct paths.
pub trait OutputSink: Send + Sync {
    /// Write `content` to the logical `path` (relative, `/`-separated) and
    /// return the number of bytes written.
    fn write(&self, path: &str, content: &mut dyn Read) -> Result<u64>;
}

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Leave the existing file alone and report `AlreadyExists`.
    #[default]
    Refuse,
    /// Atomically replace the existing file.
    Replace,
}

/// Turn a logical tree path into a relative path that cannot leave the
/// output root.
///
/// Rejects empty paths, NUL bytes, absolute paths, drive prefixes and any
/// `..` segment. `.` segments and repeated separators are dropped.
pub fn sanitize_relative_path(path: &str) -> Result<PathBuf> {
    let reject = |reason: &'static str| SinkError::UnsafePath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(reject("empty path"));
    }
    if path.contains('\0') {
        return Err(reject("NUL byte in path"));
    }

    let mut clean = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(reject("parent directory segment")),
            Component::RootDir | Component::Prefix(_) => return Err(reject("absolute path")),
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(reject("no file name"));
    }
    Ok(clean)
}

/// Sink writing into a local directory.
#[derive(Debug, Clone)]
pub struct DirSink {
    root: PathBuf,
    overwrite: OverwritePolicy,
}

impl DirSink {
    /// Create the sink, creating `root` (and its parents) if needed.
    pub fn new(root: impl Into<PathBuf>, overwrite: OverwritePolicy) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| SinkError::Root {
            path: root.clone(),
            source,
        })?;
        info!(root = %root.display(), ?overwrite, "Output root ready");
        Ok(Self { root, overwrite })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn overwrite_policy(&self) -> OverwritePolicy {
        self.overwrite
    }

    /// Create the directories leading to `relative` one level at a time and
    /// return the innermost one. A level that is a symlink is rejected
    /// instead of followed.
    fn prepare_parent(&self, path: &str, relative: &Path) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                break;
            }
            dir.push(component);
            if let Err(e) = fs::create_dir(&dir) {
                if e.kind() != io::ErrorKind::AlreadyExists {
                    return Err(e.into());
                }
            }
            let meta = dir.symlink_metadata()?;
            if meta.file_type().is_symlink() {
                return Err(SinkError::UnsafePath {
                    path: path.to_string(),
                    reason: "symlink in output path",
                });
            }
            if !meta.is_dir() {
                return Err(SinkError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not a directory", dir.display()),
                )));
            }
        }
        Ok(dir)
    }
}

impl OutputSink for DirSink {
    fn write(&self, path: &str, content: &mut dyn Read) -> Result<u64> {
        let relative = sanitize_relative_path(path)?;
        let parent = self.prepare_parent(path, &relative)?;
        let final_path = self.root.join(&relative);

        // Cheap early-out; persist_noclobber below is the real guard.
        if self.overwrite == OverwritePolicy::Refuse && final_path.symlink_metadata().is_ok() {
            return Err(SinkError::AlreadyExists(path.to_string()));
        }

        let mut staged = tempfile::Builder::new()
            .prefix(".gclone-")
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        let bytes = io::copy(content, staged.as_file_mut())?;
        staged.as_file().sync_all()?;

        match self.overwrite {
            OverwritePolicy::Refuse => {
                staged.persist_noclobber(&final_path).map_err(|e| {
                    if e.error.kind() == io::ErrorKind::AlreadyExists {
                        SinkError::AlreadyExists(path.to_string())
                    } else {
                        SinkError::Io(e.error)
                    }
                })?;
            }
            OverwritePolicy::Replace => {
                staged
                    .persist(&final_path)
                    .map_err(|e| SinkError::Io(e.error))?;
            }
        }

        debug!(path = %final_path.display(), bytes, "Committed file");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.served {
                self.served = true;
                buf[..4].copy_from_slice(b"half");
                return Ok(4);
            }
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "source went away"))
        }
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_sanitize_accepts_nested_relative_paths() {
        assert_eq!(
            sanitize_relative_path("src/main.go").unwrap(),
            PathBuf::from("src").join("main.go")
        );
        assert_eq!(
            sanitize_relative_path("./a//b/./c.txt").unwrap(),
            PathBuf::from("a").join("b").join("c.txt")
        );
    }

    #[test]
    fn test_sanitize_rejects_escapes() {
        for bad in ["", ".", "./", "../secret", "a/../../b", "/etc/passwd", "a\0b"] {
            let err = sanitize_relative_path(bad).unwrap_err();
            assert!(
                matches!(err, SinkError::UnsafePath { .. }),
                "expected UnsafePath for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_dir_sink_creates_intermediate_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirSink::new(tmp.path().join("out"), OverwritePolicy::Refuse).unwrap();

        let bytes = sink
            .write("src/pkg/main.go", &mut Cursor::new(b"package main".to_vec()))
            .unwrap();

        assert_eq!(bytes, 12);
        let written = fs::read_to_string(tmp.path().join("out/src/pkg/main.go")).unwrap();
        assert_eq!(written, "package main");
        assert_eq!(leftovers(&tmp.path().join("out/src/pkg")), vec!["main.go"]);
    }

    #[test]
    fn test_dir_sink_refuses_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirSink::new(tmp.path(), OverwritePolicy::Refuse).unwrap();
        fs::write(tmp.path().join("keep.txt"), "original").unwrap();

        let err = sink
            .write("keep.txt", &mut Cursor::new(b"new".to_vec()))
            .unwrap_err();

        assert!(matches!(err, SinkError::AlreadyExists(ref p) if p == "keep.txt"));
        assert_eq!(fs::read_to_string(tmp.path().join("keep.txt")).unwrap(), "original");
    }

    #[test]
    fn test_dir_sink_replaces_when_allowed() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirSink::new(tmp.path(), OverwritePolicy::Replace).unwrap();
        fs::write(tmp.path().join("file.txt"), "old").unwrap();

        sink.write("file.txt", &mut Cursor::new(b"new".to_vec()))
            .unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("file.txt")).unwrap(), "new");
    }

    #[test]
    fn test_dir_sink_rejects_traversal_before_touching_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("out");
        let sink = DirSink::new(&root, OverwritePolicy::Replace).unwrap();

        let err = sink
            .write("../escaped.txt", &mut Cursor::new(b"x".to_vec()))
            .unwrap_err();

        assert!(matches!(err, SinkError::UnsafePath { .. }));
        assert!(!tmp.path().join("escaped.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_dir_sink_does_not_follow_symlinked_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside");
        let root = tmp.path().join("out");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink("../outside", root.join("src")).unwrap();
        let sink = DirSink::new(&root, OverwritePolicy::Replace).unwrap();

        let err = sink
            .write("src/main.go", &mut Cursor::new(b"package main".to_vec()))
            .unwrap_err();

        assert!(matches!(err, SinkError::UnsafePath { ref path, .. } if path == "src/main.go"));
        assert!(!outside.join("main.go").exists());
        assert!(leftovers(&outside).is_empty(), "found {:?}", leftovers(&outside));
    }

    #[cfg(unix)]
    #[test]
    fn test_dir_sink_checks_every_directory_level() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside");
        let root = tmp.path().join("out");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("a/b")).unwrap();
        let sink = DirSink::new(&root, OverwritePolicy::Refuse).unwrap();

        let err = sink
            .write("a/b/c/deep.txt", &mut Cursor::new(b"x".to_vec()))
            .unwrap_err();

        assert!(matches!(err, SinkError::UnsafePath { .. }));
        assert!(!outside.join("c").exists());

        // A real directory next to the link is still fine.
        sink.write("a/real/ok.txt", &mut Cursor::new(b"ok".to_vec()))
            .unwrap();
        assert_eq!(fs::read_to_string(root.join("a/real/ok.txt")).unwrap(), "ok");
    }

    #[test]
    fn test_file_in_place_of_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirSink::new(tmp.path(), OverwritePolicy::Replace).unwrap();
        fs::write(tmp.path().join("src"), "not a dir").unwrap();

        let err = sink
            .write("src/main.go", &mut Cursor::new(b"x".to_vec()))
            .unwrap_err();

        assert!(matches!(err, SinkError::Io(_)));
        assert_eq!(fs::read_to_string(tmp.path().join("src")).unwrap(), "not a dir");
    }

    #[test]
    fn test_failed_read_leaves_no_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirSink::new(tmp.path(), OverwritePolicy::Refuse).unwrap();

        let err = sink
            .write("broken.bin", &mut FailingReader { served: false })
            .unwrap_err();

        assert!(matches!(err, SinkError::Io(_)));
        assert!(leftovers(tmp.path()).is_empty(), "found {:?}", leftovers(tmp.path()));
    }
}
