//! Git trees read through the `git` executable.
//!
//! Listing uses `git ls-tree -r -z`, streamed from the child's stdout so
//! the walk stays lazy. Each file's content is a separate
//! `git cat-file blob` process started only when a worker opens it.

use super::{
    note_entry_error, ContentSource, FileDescriptor, TreeWalker, WalkErrorPolicy, WalkSummary,
};
use crate::error::{ExtractError, Result};
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// Environment variable overriding the `git` executable.
pub const GIT_BIN_ENV: &str = "GCLONE_GIT_BIN";

fn git_binary() -> PathBuf {
    std::env::var_os(GIT_BIN_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("git"))
}

fn git_command(repo: &Path) -> Command {
    let mut cmd = Command::new(git_binary());
    cmd.arg("-C").arg(repo);
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

fn spawn_error(e: io::Error) -> ExtractError {
    if e.kind() == io::ErrorKind::NotFound {
        ExtractError::Git(format!(
            "git executable '{}' not found. Install git or set {}.",
            git_binary().display(),
            GIT_BIN_ENV
        ))
    } else {
        ExtractError::Git(format!("failed to spawn git: {e}"))
    }
}

/// Run a git command to completion and return its trimmed stdout.
fn run_git(mut cmd: Command) -> Result<String> {
    let description = describe_command(&cmd);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(spawn_error)?;
    if !output.status.success() {
        return Err(ExtractError::Git(format!(
            "`{}` failed ({}): {}",
            description,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn describe_command(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Options for [`GitTree::clone_remote`].
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// History depth; `None` clones everything.
    pub depth: Option<u32>,
    /// Branch or tag to check out instead of the remote HEAD.
    pub branch: Option<String>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            depth: Some(1),
            branch: None,
        }
    }
}

/// Files of one git commit.
#[derive(Debug)]
pub struct GitTree {
    git_dir: Arc<PathBuf>,
    commit: String,
    error_policy: WalkErrorPolicy,
    // Kept alive so the clone is removed when the tree is dropped.
    _clone_dir: Option<TempDir>,
}

impl GitTree {
    /// Open `rev` of an existing repository (work tree or bare).
    pub fn open(repo: &Path, rev: &str) -> Result<Self> {
        if !repo.exists() {
            return Err(ExtractError::SourceNotFound(repo.display().to_string()));
        }
        let commit = resolve_commit(repo, rev)?;
        info!(repo = %repo.display(), rev, commit = %commit, "Opened git tree");
        Ok(Self {
            git_dir: Arc::new(repo.to_path_buf()),
            commit,
            error_policy: WalkErrorPolicy::default(),
            _clone_dir: None,
        })
    }

    /// Clone `url` into a temporary bare repository and open its HEAD.
    pub fn clone_remote(url: &str, options: &CloneOptions) -> Result<Self> {
        let clone_dir = tempfile::Builder::new().prefix("gclone-").tempdir()?;
        let target = clone_dir.path().join("repo.git");

        let mut cmd = Command::new(git_binary());
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .arg("clone")
            .arg("--bare")
            .arg("--quiet");
        if let Some(depth) = options.depth {
            cmd.arg("--depth").arg(depth.to_string());
        }
        if let Some(branch) = &options.branch {
            cmd.arg("--branch").arg(branch);
        }
        cmd.arg("--").arg(url).arg(&target);

        info!(url, depth = ?options.depth, branch = ?options.branch, "Cloning repository");
        run_git(cmd)?;

        let commit = resolve_commit(&target, "HEAD")?;
        info!(url, commit = %commit, "Clone complete");
        Ok(Self {
            git_dir: Arc::new(target),
            commit,
            error_policy: WalkErrorPolicy::default(),
            _clone_dir: Some(clone_dir),
        })
    }

    pub fn with_error_policy(mut self, policy: WalkErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Full id of the commit being walked.
    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Stream ls-tree records into `visit`. Returns true if `visit` broke.
    fn stream_entries(
        &self,
        stdout: ChildStdout,
        visit: &mut dyn FnMut(FileDescriptor) -> ControlFlow<()>,
        summary: &mut WalkSummary,
    ) -> Result<bool> {
        for record in BufReader::new(stdout).split(b'\0') {
            let record = record?;
            if record.is_empty() {
                continue;
            }
            let entry = match parse_ls_tree_record(&record) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    note_entry_error(self.error_policy, e, summary)?;
                    continue;
                }
            };

            summary.files_visited += 1;
            let blob = GitBlob {
                git_dir: Arc::clone(&self.git_dir),
                oid: entry.oid,
            };
            if visit(FileDescriptor::new(entry.path, blob)).is_break() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn resolve_commit(repo: &Path, rev: &str) -> Result<String> {
    let mut cmd = git_command(repo);
    cmd.args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("{rev}^{{commit}}"));
    run_git(cmd).map_err(|e| match e {
        ExtractError::Git(msg) => ExtractError::Git(format!(
            "cannot resolve '{}' in {}: {}",
            rev,
            repo.display(),
            msg
        )),
        other => other,
    })
}

impl TreeWalker for GitTree {
    fn for_each_file(
        &mut self,
        visit: &mut dyn FnMut(FileDescriptor) -> ControlFlow<()>,
    ) -> Result<WalkSummary> {
        let mut child = git_command(&self.git_dir)
            .args(["ls-tree", "-r", "-z", "--full-tree"])
            .arg(&self.commit)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::InvalidState("Missing ls-tree stdout".to_string()))?;

        let mut summary = WalkSummary::default();
        let streamed = self.stream_entries(stdout, visit, &mut summary);

        match streamed {
            Ok(false) => {
                let output = child.wait_with_output()?;
                if !output.status.success() {
                    return Err(ExtractError::Git(format!(
                        "ls-tree of {} failed ({}): {}",
                        self.commit,
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
                Ok(summary)
            }
            Ok(true) => {
                debug!(commit = %self.commit, "Git walk stopped early");
                reap(&mut child);
                Ok(summary)
            }
            Err(e) => {
                reap(&mut child);
                Err(e)
            }
        }
    }

    fn describe(&self) -> String {
        format!("git {} @ {}", self.git_dir.display(), self.commit)
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug, PartialEq, Eq)]
struct LsTreeEntry {
    oid: String,
    path: String,
}

/// Parse one `-z` record: `<mode> SP <type> SP <oid> TAB <path>`.
///
/// Only blobs are returned; trees and submodule commits yield `None`.
fn parse_ls_tree_record(record: &[u8]) -> Result<Option<LsTreeEntry>> {
    let malformed = || {
        ExtractError::InvalidEntry(format!(
            "malformed ls-tree record: {}",
            String::from_utf8_lossy(record)
        ))
    };

    let tab = record.iter().position(|b| *b == b'\t').ok_or_else(malformed)?;
    let (meta, path) = (&record[..tab], &record[tab + 1..]);
    let meta = std::str::from_utf8(meta).map_err(|_| malformed())?;
    let mut fields = meta.split(' ');
    let (Some(_mode), Some(kind), Some(oid), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };

    if kind != "blob" {
        return Ok(None);
    }
    if path.is_empty() {
        return Err(malformed());
    }
    let path = String::from_utf8(path.to_vec()).map_err(|_| {
        ExtractError::InvalidEntry(format!(
            "non UTF-8 path: {}",
            String::from_utf8_lossy(path)
        ))
    })?;

    Ok(Some(LsTreeEntry {
        oid: oid.to_string(),
        path,
    }))
}

/// Content of one blob, read through `git cat-file`.
struct GitBlob {
    git_dir: Arc<PathBuf>,
    oid: String,
}

impl ContentSource for GitBlob {
    fn open(self: Box<Self>) -> io::Result<Box<dyn Read + Send>> {
        let mut child = git_command(&self.git_dir)
            .args(["cat-file", "blob", &self.oid])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "git cat-file has no stdout")
        })?;
        Ok(Box::new(BlobReader {
            child,
            stdout,
            oid: self.oid,
            finished: false,
        }))
    }
}

/// Reader over a `cat-file` child; a failed exit surfaces as an error at EOF.
struct BlobReader {
    child: Child,
    stdout: ChildStdout,
    oid: String,
    finished: bool,
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("git cat-file blob {} failed ({})", self.oid, status),
                ));
            }
        }
        Ok(n)
    }
}

impl Drop for BlobReader {
    fn drop(&mut self) {
        if !self.finished {
            debug!(oid = %self.oid, "Abandoning unfinished blob read");
            reap(&mut self.child);
        }
    }
}
