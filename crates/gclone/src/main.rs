//! gclone - copy the files of a git tree that match a glob pattern
//!
//! Usage:
//!   gclone -r https://github.com/owner/repo -g '**/*.go' -e '**/*_test.go'
//!   gclone -r ./checkout --rev v1.2.0 -o out
//!   gclone -r ./plain-dir -g 'docs/**' -j 4

use clap::Parser;
use gclone_extract::{CancellationToken, ExtractError};
use gclone_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

mod cli;

/// Source used when `--repo` is not given.
const DEFAULT_REPO: &str = "https://github.com/example-owner/example-repo";

/// Exit code for a run stopped by SIGINT/SIGTERM.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "gclone",
    version,
    about = "Clone only the files of a git tree that match a glob"
)]
struct Cli {
    /// Remote URL, local git repository, or plain directory
    #[arg(short = 'r', long, default_value = DEFAULT_REPO)]
    repo: String,

    /// Revision of a local repository, or branch/tag of a remote clone
    #[arg(long)]
    rev: Option<String>,

    /// Include pattern; '*' does not cross '/', use '**' for that
    #[arg(short = 'g', long, default_value = "**")]
    glob: String,

    /// Exclude pattern, applied after the include pattern
    #[arg(short = 'e', long)]
    exclude: Option<String>,

    /// Output directory [default: _gclone]
    #[arg(short = 'o', long)]
    outdir: Option<PathBuf>,

    /// Number of writer threads [default: available CPUs]
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Replace files that already exist in the output directory
    #[arg(long)]
    force: bool,

    /// Fail on a malformed exclude pattern instead of ignoring it
    #[arg(long)]
    strict_exclude: bool,

    /// Stop at the first unreadable tree entry
    #[arg(long)]
    halt_on_walk_error: bool,

    /// Match patterns case-insensitively
    #[arg(long)]
    ignore_case: bool,

    /// Give up on a single file after this many seconds
    #[arg(long, value_name = "SECS")]
    file_timeout: Option<u64>,

    /// Clone depth for remote sources (0 = full history)
    #[arg(long)]
    depth: Option<u32>,

    /// Config file [default: $GCLONE_HOME/config.toml]
    #[arg(long, env = "GCLONE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long)]
    verbose: bool,

    /// No per-file progress lines, errors only on stderr
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn into_args(self) -> cli::clone::CloneArgs {
        cli::clone::CloneArgs {
            repo: self.repo,
            rev: self.rev,
            glob: self.glob,
            exclude: self.exclude,
            outdir: self.outdir,
            workers: self.workers,
            force: self.force,
            strict_exclude: self.strict_exclude,
            halt_on_walk_error: self.halt_on_walk_error,
            ignore_case: self.ignore_case,
            file_timeout: self.file_timeout,
            depth: self.depth,
            config: self.config,
            quiet: self.quiet,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = init_logging(LogConfig {
        app_name: "gclone",
        verbose: cli.verbose,
        quiet: cli.quiet,
    });

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_signal_handlers(Arc::clone(&shutdown_flag)) {
        warn!("Failed to install signal handlers: {}", e);
    }
    let cancel = CancellationToken::from_flag(shutdown_flag);

    match cli::clone::run(cli.into_args(), cancel.clone()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            let cancelled = cancel.is_cancelled()
                || matches!(
                    err.downcast_ref::<ExtractError>(),
                    Some(ExtractError::Cancelled)
                );
            if cancelled {
                eprintln!("Cancelled");
                ExitCode::from(EXIT_CANCELLED)
            } else {
                eprintln!("{:?}", err);
                ExitCode::FAILURE
            }
        }
    }
}

/// First signal cancels the run; a second one exits immediately.
fn install_signal_handlers(flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::Builder::new()
            .name("gclone-signals".to_string())
            .spawn(move || {
                for sig in signals.forever() {
                    if flag.swap(true, Ordering::SeqCst) {
                        std::process::exit(i32::from(EXIT_CANCELLED));
                    }
                    info!("Received signal {}, cancelling...", sig);
                }
            })?;
    }

    #[cfg(windows)]
    {
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(i32::from(EXIT_CANCELLED));
            }
            info!("Received Ctrl+C, cancelling...");
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["gclone"]).unwrap();
        assert_eq!(cli.repo, DEFAULT_REPO);
        assert_eq!(cli.glob, "**");
        assert!(cli.exclude.is_none());
        assert!(cli.outdir.is_none());
        assert!(!cli.strict_exclude);
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "gclone", "-r", "./repo", "-g", "**/*.go", "-e", "**/*_test.go", "-o", "out", "-j",
            "3", "-q",
        ])
        .unwrap();
        let args = cli.into_args();
        assert_eq!(args.repo, "./repo");
        assert_eq!(args.exclude.as_deref(), Some("**/*_test.go"));
        assert_eq!(args.outdir, Some(PathBuf::from("out")));
        assert_eq!(args.workers, Some(3));
        assert!(args.quiet);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["gclone", "-q", "-v"]).is_err());
    }
}
