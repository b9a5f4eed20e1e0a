//! Concurrent extraction: walk, filter, fan out to writers, wait.
//!
//! # Design
//!
//! ```text
//!  calling thread                       worker threads (N)
//! ┌──────────────┐   bounded(0)    ┌────────────────────────┐
//! │ TreeWalker   │ ──────────────▶ │ open content           │
//! │  └ filter    │  rendezvous:    │  └ OutputSink::write   │──▶ ExtractEvent
//! │  └ path check│  send blocks    │     (Written / Failed) │
//! └──────────────┘  until a worker └────────────────────────┘
//!                   is free
//! ```
//!
//! - The producer never buffers: at most N files are in flight.
//! - Per-file failures become `ExtractEvent::Failed` and a warning; they
//!   never stop the run.
//! - `run` joins every worker before returning, so every dispatched file
//!   has produced exactly one event by then.

use crate::cancel::CancellationToken;
use crate::config::default_workers;
use crate::error::{ExtractError, Result};
use crate::patterns::{ExcludeErrorPolicy, PatternFilter};
use crate::tree::{FileDescriptor, TreeWalker, WalkSummary};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use gclone_sinks::{sanitize_relative_path, OutputSink};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Read};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often blocked channel operations re-check cancellation.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Parameters of one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub include: String,
    pub exclude: Option<String>,
    /// Number of writer threads; must be at least 1.
    pub workers: usize,
    /// Upper bound on reading one file's content. Checked before each read
    /// chunk, so a single read that blocks is not interrupted.
    pub file_timeout: Option<Duration>,
    pub exclude_error_policy: ExcludeErrorPolicy,
    pub case_insensitive: bool,
}

impl ExtractRequest {
    pub fn new(include: impl Into<String>) -> Self {
        Self {
            include: include.into(),
            exclude: None,
            workers: default_workers(),
            file_timeout: None,
            exclude_error_policy: ExcludeErrorPolicy::default(),
            case_insensitive: false,
        }
    }

    pub fn with_exclude(mut self, exclude: impl Into<String>) -> Self {
        self.exclude = Some(exclude.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Per-file outcome, one per dispatched or rejected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractEvent {
    Written { path: String, bytes: u64 },
    Failed { path: String, error: String },
}

impl ExtractEvent {
    pub fn path(&self) -> &str {
        match self {
            ExtractEvent::Written { path, .. } | ExtractEvent::Failed { path, .. } => path,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExtractEvent::Failed { .. })
    }
}

/// Progress-line rendering.
impl fmt::Display for ExtractEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractEvent::Written { path, .. } => write!(f, "{}", path),
            ExtractEvent::Failed { path, error } => write!(f, "WARN {}: {}", path, error),
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Leaf files produced by the walker.
    pub files_seen: u64,
    /// Files handed to a worker.
    pub dispatched: u64,
    pub written: u64,
    /// Per-file failures (rejected paths included).
    pub failed: u64,
    /// Files filtered out by the patterns.
    pub skipped: u64,
    pub bytes_written: u64,
    /// Tree entries the walker could not read.
    pub walk_errors: u64,
    pub duration_ms: u64,
}

#[derive(Default)]
struct Tally {
    written: AtomicU64,
    failed: AtomicU64,
    bytes_written: AtomicU64,
}

#[derive(Default)]
struct ProducerStats {
    files_seen: u64,
    dispatched: u64,
    skipped: u64,
    rejected: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Cancelled,
    WorkersGone,
}

enum Dispatch {
    Sent,
    Stopped(Stop),
}

/// Walks a tree and writes the matching files through a sink.
pub struct ExtractionPipeline<'a> {
    request: ExtractRequest,
    sink: &'a dyn OutputSink,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<ExtractEvent>>,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(request: ExtractRequest, sink: &'a dyn OutputSink) -> Self {
        Self {
            request,
            sink,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receive one `ExtractEvent` per completed or failed file.
    pub fn with_events(mut self, events: mpsc::Sender<ExtractEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn request(&self) -> &ExtractRequest {
        &self.request
    }

    /// Run one extraction to completion.
    ///
    /// Fails only for setup problems, a traversal that cannot proceed,
    /// cancellation or a panicked worker. File-level problems are counted
    /// in the report.
    pub fn run(&self, walker: &mut dyn TreeWalker) -> Result<ExtractReport> {
        let start = Instant::now();
        let workers = self.request.workers;
        if workers == 0 {
            return Err(ExtractError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        let filter = PatternFilter::from_request(&self.request)?;

        info!(
            source = %walker.describe(),
            include = %filter.include_pattern(),
            exclude = ?filter.exclude_pattern(),
            workers,
            "Starting extraction"
        );

        let tally = Tally::default();
        let (job_tx, job_rx) = crossbeam_channel::bounded::<FileDescriptor>(0);

        let (walked, joined) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let worker = Worker {
                    id,
                    sink: self.sink,
                    events: self.events.clone(),
                    cancel: self.cancel.clone(),
                    file_timeout: self.request.file_timeout,
                    tally: &tally,
                };
                let jobs = job_rx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("gclone-worker-{id}"))
                    .spawn_scoped(scope, move || worker.run(jobs));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        drop(job_tx);
                        let _ = join_workers(handles);
                        return (Err(ExtractError::Io(e)), Ok(()));
                    }
                }
            }
            drop(job_rx);

            let walked = self.produce(walker, &filter, &job_tx);
            // Closing the channel lets idle workers drain and exit.
            drop(job_tx);
            (walked, join_workers(handles))
        });

        joined?;
        let (producer, walk_summary, stop) = walked?;
        if stop == Some(Stop::Cancelled) || self.cancel.is_cancelled() {
            warn!(dispatched = producer.dispatched, "Extraction cancelled");
            return Err(ExtractError::Cancelled);
        }
        if stop == Some(Stop::WorkersGone) {
            return Err(ExtractError::InvalidState(
                "all workers exited before the walk finished".to_string(),
            ));
        }

        let report = ExtractReport {
            files_seen: producer.files_seen,
            dispatched: producer.dispatched,
            written: tally.written.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed) + producer.rejected,
            skipped: producer.skipped,
            bytes_written: tally.bytes_written.load(Ordering::Relaxed),
            walk_errors: walk_summary.errors,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            seen = report.files_seen,
            written = report.written,
            failed = report.failed,
            skipped = report.skipped,
            bytes = report.bytes_written,
            walk_errors = report.walk_errors,
            duration_ms = report.duration_ms,
            "Extraction complete"
        );
        Ok(report)
    }

    /// Traversal side: filter, check, and hand files to the pool.
    fn produce(
        &self,
        walker: &mut dyn TreeWalker,
        filter: &PatternFilter,
        jobs: &Sender<FileDescriptor>,
    ) -> Result<(ProducerStats, WalkSummary, Option<Stop>)> {
        let mut stats = ProducerStats::default();
        let mut stop = None;
        let mut dispatched_paths: HashSet<PathBuf> = HashSet::new();

        let summary = walker.for_each_file(&mut |descriptor| {
            if self.cancel.is_cancelled() {
                stop = Some(Stop::Cancelled);
                return ControlFlow::Break(());
            }
            stats.files_seen += 1;

            if !filter.should_include(descriptor.path()) {
                stats.skipped += 1;
                return ControlFlow::Continue(());
            }

            let target = match sanitize_relative_path(descriptor.path()) {
                Ok(target) => target,
                Err(e) => {
                    stats.rejected += 1;
                    self.report_failure(descriptor.path(), e.to_string());
                    return ControlFlow::Continue(());
                }
            };
            if !dispatched_paths.insert(target) {
                stats.rejected += 1;
                self.report_failure(
                    descriptor.path(),
                    "path already extracted in this run".to_string(),
                );
                return ControlFlow::Continue(());
            }

            match self.dispatch(jobs, descriptor) {
                Dispatch::Sent => {
                    stats.dispatched += 1;
                    ControlFlow::Continue(())
                }
                Dispatch::Stopped(reason) => {
                    stop = Some(reason);
                    ControlFlow::Break(())
                }
            }
        })?;

        debug!(
            visited = summary.files_visited,
            dispatched = stats.dispatched,
            "Traversal finished"
        );
        Ok((stats, summary, stop))
    }

    /// Blocking hand-off that still notices cancellation.
    fn dispatch(&self, jobs: &Sender<FileDescriptor>, mut descriptor: FileDescriptor) -> Dispatch {
        loop {
            if self.cancel.is_cancelled() {
                return Dispatch::Stopped(Stop::Cancelled);
            }
            match jobs.send_timeout(descriptor, CANCEL_POLL_INTERVAL) {
                Ok(()) => return Dispatch::Sent,
                Err(SendTimeoutError::Timeout(returned)) => descriptor = returned,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Dispatch::Stopped(Stop::WorkersGone)
                }
            }
        }
    }

    fn report_failure(&self, path: &str, error: String) {
        warn!(path = %path, error = %error, "There was an error processing file");
        if let Some(tx) = &self.events {
            let _ = tx.send(ExtractEvent::Failed {
                path: path.to_string(),
                error,
            });
        }
    }
}

fn join_workers(handles: Vec<ScopedJoinHandle<'_, ()>>) -> Result<()> {
    let mut panicked = None;
    for (id, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            error!(worker = id, "Worker panicked");
            panicked.get_or_insert(id);
        }
    }
    match panicked {
        Some(id) => Err(ExtractError::WorkerPanicked(id)),
        None => Ok(()),
    }
}

struct Worker<'a> {
    id: usize,
    sink: &'a dyn OutputSink,
    events: Option<mpsc::Sender<ExtractEvent>>,
    cancel: CancellationToken,
    file_timeout: Option<Duration>,
    tally: &'a Tally,
}

impl Worker<'_> {
    fn run(self, jobs: Receiver<FileDescriptor>) {
        let mut processed = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match jobs.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(descriptor) => {
                    self.extract(descriptor);
                    processed += 1;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = self.id, processed, "Worker finished");
    }

    fn extract(&self, descriptor: FileDescriptor) {
        let (path, content) = descriptor.into_parts();
        let reader = match content.open() {
            Ok(reader) => reader,
            Err(e) => {
                self.fail(path, format!("cannot open content: {e}"));
                return;
            }
        };

        let mut reader = GuardedReader::new(reader, self.cancel.clone(), self.file_timeout);
        match self.sink.write(&path, &mut reader) {
            Ok(bytes) => {
                self.tally.written.fetch_add(1, Ordering::Relaxed);
                self.tally.bytes_written.fetch_add(bytes, Ordering::Relaxed);
                debug!(worker = self.id, path = %path, bytes, "Extracted file");
                self.emit(ExtractEvent::Written { path, bytes });
            }
            Err(e) => self.fail(path, e.to_string()),
        }
    }

    fn fail(&self, path: String, error: String) {
        self.tally.failed.fetch_add(1, Ordering::Relaxed);
        warn!(worker = self.id, path = %path, error = %error, "There was an error processing file");
        self.emit(ExtractEvent::Failed { path, error });
    }

    fn emit(&self, event: ExtractEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Content reader that gives up on cancellation or after a deadline.
///
/// Both are checked between chunks: a read already handed to `inner` runs
/// to completion, and the next call fails. The bound covers reading only,
/// not the sink's fsync or rename.
struct GuardedReader<R> {
    inner: R,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<R: Read> GuardedReader<R> {
    fn new(inner: R, cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            inner,
            cancel,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }
}

impl<R: Read> Read for GuardedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Not ErrorKind::Interrupted: io::copy would retry it forever.
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "extraction cancelled"));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "per-file timeout exceeded",
            ));
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemoryTree;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Sink that keeps everything in memory.
    #[derive(Default)]
    struct RecordingSink {
        files: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl OutputSink for RecordingSink {
        fn write(&self, path: &str, content: &mut dyn Read) -> gclone_sinks::Result<u64> {
            let mut data = Vec::new();
            content.read_to_end(&mut data)?;
            let len = data.len() as u64;
            self.files.lock().unwrap().push((path.to_string(), data));
            Ok(len)
        }
    }

    #[test]
    fn test_event_display_is_progress_line() {
        let written = ExtractEvent::Written {
            path: "src/main.go".to_string(),
            bytes: 3,
        };
        let failed = ExtractEvent::Failed {
            path: "bad.bin".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(written.to_string(), "src/main.go");
        assert_eq!(failed.to_string(), "WARN bad.bin: boom");
        assert!(failed.is_failure());
        assert_eq!(failed.path(), "bad.bin");
    }

    #[test]
    fn test_zero_workers_is_config_error() {
        let sink = RecordingSink::default();
        let pipeline = ExtractionPipeline::new(ExtractRequest::new("*").with_workers(0), &sink);
        let err = pipeline.run(&mut MemoryTree::new()).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn test_bad_include_fails_before_traversal() {
        let sink = RecordingSink::default();
        let pipeline = ExtractionPipeline::new(ExtractRequest::new("[").with_workers(1), &sink);
        let err = pipeline
            .run(&mut MemoryTree::new().with_file("a", "1"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Pattern(_)));
        assert!(sink.files.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_paths_are_written_once() {
        let sink = RecordingSink::default();
        let (tx, rx) = mpsc::channel();
        let pipeline = ExtractionPipeline::new(ExtractRequest::new("**").with_workers(2), &sink)
            .with_events(tx);

        let mut tree = MemoryTree::new()
            .with_file("a/b.txt", "first")
            .with_file("a/./b.txt", "second");
        let report = pipeline.run(&mut tree).unwrap();
        drop(pipeline);

        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 1);
        let files = sink.files.lock().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, b"first");
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.iter().filter(|e| e.is_failure()).count(), 1);
    }

    #[test]
    fn test_guarded_reader_honours_deadline_and_cancel() {
        let token = CancellationToken::new();
        let mut expired = GuardedReader::new(
            Cursor::new(b"data".to_vec()),
            token.clone(),
            Some(Duration::ZERO),
        );
        let err = expired.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        let mut live = GuardedReader::new(Cursor::new(b"data".to_vec()), token.clone(), None);
        assert_eq!(live.read(&mut [0u8; 4]).unwrap(), 4);
        token.cancel();
        assert!(live.read(&mut [0u8; 4]).is_err());
    }

    /// Serves one byte per read, sleeping before each.
    struct SlowReader {
        delay: Duration,
        remaining: usize,
    }

    impl Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Ok(0);
            }
            std::thread::sleep(self.delay);
            self.remaining -= 1;
            buf[0] = b'x';
            Ok(1)
        }
    }

    #[test]
    fn test_deadline_is_checked_between_chunks() {
        let slow = SlowReader {
            delay: Duration::from_millis(60),
            remaining: 3,
        };
        let mut reader = GuardedReader::new(
            slow,
            CancellationToken::new(),
            Some(Duration::from_millis(20)),
        );

        // The first read outlives the deadline but is not cut short.
        assert_eq!(reader.read(&mut [0u8; 8]).unwrap(), 1);
        let err = reader.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(reader.inner.remaining, 2);
    }
}
