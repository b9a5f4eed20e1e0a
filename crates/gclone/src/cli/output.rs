//! Human-readable output helpers

use gclone_extract::{ExtractEvent, ExtractReport};
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc::Receiver;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a duration in milliseconds, e.g. `850ms` or `2.4s`
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Final one-line summary of a run.
pub fn summary_line(report: &ExtractReport, outdir: &Path) -> String {
    let noun = if report.written == 1 { "file" } else { "files" };
    let mut line = format!(
        "Extracted {} {} ({}) to {} in {}",
        report.written,
        noun,
        format_size(report.bytes_written),
        outdir.display(),
        format_duration_ms(report.duration_ms)
    );
    if report.failed > 0 {
        line.push_str(&format!(", {} failed", report.failed));
    }
    if report.walk_errors > 0 {
        line.push_str(&format!(", {} unreadable tree entries", report.walk_errors));
    }
    line
}

/// Print one progress line per event until the sender side is dropped.
///
/// Returns the number of events seen. Lines are suppressed when `quiet`.
pub fn print_events(events: Receiver<ExtractEvent>, quiet: bool) -> u64 {
    let stdout = io::stdout();
    let mut seen = 0;
    for event in events {
        seen += 1;
        if quiet {
            continue;
        }
        let mut out = stdout.lock();
        // A closed stdout (e.g. `| head`) must not stop the extraction.
        let _ = writeln!(out, "{}", event);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(2400), "2.4s");
    }

    #[test]
    fn test_summary_line() {
        let report = ExtractReport {
            written: 1,
            bytes_written: 2048,
            duration_ms: 12,
            ..ExtractReport::default()
        };
        assert_eq!(
            summary_line(&report, Path::new("_gclone")),
            "Extracted 1 file (2.0 KB) to _gclone in 12ms"
        );

        let report = ExtractReport {
            written: 3,
            failed: 2,
            walk_errors: 1,
            ..report
        };
        let line = summary_line(&report, Path::new("out"));
        assert!(line.starts_with("Extracted 3 files"));
        assert!(line.ends_with(", 2 failed, 1 unreadable tree entries"));
    }

    #[test]
    fn test_print_events_counts_until_disconnect() {
        let (tx, rx) = mpsc::channel();
        tx.send(ExtractEvent::Written {
            path: "a".to_string(),
            bytes: 1,
        })
        .unwrap();
        tx.send(ExtractEvent::Failed {
            path: "b".to_string(),
            error: "boom".to_string(),
        })
        .unwrap();
        drop(tx);
        assert_eq!(print_events(rx, true), 2);
    }
}
