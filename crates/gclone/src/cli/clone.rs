//! Clone command - extract the files matching a glob from a tree
//!
//! Resolves the source, opens it, and runs the extraction pipeline into a
//! directory sink. Per-file problems are printed as `WARN` progress lines
//! and never fail the command.

use crate::cli::config::load_config;
use crate::cli::error::HelpfulError;
use crate::cli::output::{print_events, summary_line};
use gclone_extract::{
    CancellationToken, ExtractConfig, ExtractError, ExtractReport, ExtractionPipeline, TreeSource,
};
use gclone_sinks::{DirSink, SinkError};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use tracing::info;

/// Arguments for the clone command
#[derive(Debug, Clone, Default)]
pub struct CloneArgs {
    pub repo: String,
    pub rev: Option<String>,
    pub glob: String,
    pub exclude: Option<String>,
    pub outdir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub force: bool,
    pub strict_exclude: bool,
    pub halt_on_walk_error: bool,
    pub ignore_case: bool,
    pub file_timeout: Option<u64>,
    pub depth: Option<u32>,
    pub config: Option<PathBuf>,
    pub quiet: bool,
}

/// Execute the clone command
pub fn run(args: CloneArgs, cancel: CancellationToken) -> anyhow::Result<ExtractReport> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    if config.workers == 0 {
        return Err(HelpfulError::invalid_config("worker count must be at least 1").into());
    }

    let source = TreeSource::parse(&args.repo);
    info!(source = %source, "Opening source");
    let mut opened = source
        .open(&config.source_options(args.rev.as_deref()))
        .map_err(|e| explain(e, &args.repo))?;
    if let Some(commit) = &opened.commit {
        println!("commit {}", commit);
    }

    let outdir = PathBuf::from(&config.outdir);
    let sink = DirSink::new(&outdir, config.overwrite_policy()).map_err(|e| match e {
        SinkError::Root { path, source } => {
            anyhow::Error::new(HelpfulError::output_root(&path, &source.to_string()))
        }
        other => anyhow::Error::new(other),
    })?;

    let request = config.to_request(&args.glob, args.exclude.as_deref());
    let (events_tx, events_rx) = mpsc::channel();
    let pipeline = ExtractionPipeline::new(request, &sink)
        .with_cancellation(cancel)
        .with_events(events_tx);

    let quiet = args.quiet;
    let result = thread::scope(|scope| {
        let printer = scope.spawn(move || print_events(events_rx, quiet));
        let result = pipeline.run(&mut opened.walker);
        // Dropping the pipeline closes the event channel and ends the printer.
        drop(pipeline);
        let _ = printer.join();
        result
    });

    let report = result.map_err(|e| explain(e, &args.repo))?;
    println!("{}", summary_line(&report, &outdir));
    Ok(report)
}

/// Command-line flags take precedence over the config file.
fn apply_overrides(config: &mut ExtractConfig, args: &CloneArgs) {
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(outdir) = &args.outdir {
        config.outdir = outdir.display().to_string();
    }
    if let Some(secs) = args.file_timeout {
        config.file_timeout_secs = Some(secs);
    }
    if let Some(depth) = args.depth {
        config.depth = depth;
    }
    if args.force {
        config.overwrite = true;
    }
    if args.strict_exclude {
        config.fail_on_bad_exclude = true;
    }
    if args.halt_on_walk_error {
        config.halt_on_walk_error = true;
    }
    if args.ignore_case {
        config.case_insensitive = true;
    }
}

/// Turn fatal extraction errors into actionable messages.
fn explain(err: ExtractError, source: &str) -> anyhow::Error {
    match err {
        ExtractError::SourceNotFound(path) => HelpfulError::source_not_found(&path).into(),
        ExtractError::Git(details) => HelpfulError::git_failed(source, &details).into(),
        ExtractError::Pattern(details) => HelpfulError::invalid_pattern(&details).into(),
        ExtractError::Config(details) => HelpfulError::invalid_config(&details).into(),
        // Cancelled and the rest stay typed so main can pick an exit code.
        other => other.into(),
    }
}
