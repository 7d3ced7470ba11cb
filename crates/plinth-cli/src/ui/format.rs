//! Formatting utilities for sizes, durations, and build summaries.

use owo_colors::OwoColorize;
use std::time::Duration;

/// Format file size in human-readable format.
///
/// Converts bytes to the most appropriate unit (B, KB, MB, GB).
///
/// # Examples
///
/// ```
/// use plinth_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(500), "500 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// assert_eq!(format_size(1_048_576), "1.00 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Format duration in human-readable format.
///
/// Converts to the most appropriate unit (ms, s, m:s).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use plinth_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    }
}

/// Print a build summary to stderr.
///
/// Lists each built artifact with its size and build time, followed by a
/// total line. Artifacts that were skipped (no entry configured) are simply
/// absent from the list.
///
/// # Arguments
///
/// * `entries` - Slice of (artifact name, size in bytes, duration) tuples
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use plinth_cli::ui::print_build_summary;
///
/// print_build_summary(&[
///     ("main.js".to_string(), 15_234, Duration::from_millis(450)),
///     ("ui.html".to_string(), 84_120, Duration::from_millis(900)),
/// ]);
/// ```
pub fn print_build_summary(entries: &[(String, u64, Duration)]) {
    eprintln!();
    for (name, size, duration) in entries {
        eprintln!(
            "  {} {}  {}  {}",
            "▸".blue(),
            name.bold(),
            format_size(*size).dimmed(),
            format!("({})", format_duration(*duration)).dimmed()
        );
    }

    let total_size: u64 = entries.iter().map(|(_, s, _)| s).sum();
    let total_time: Duration = entries.iter().map(|(_, _, d)| d).sum();

    eprintln!(
        "\n  {} {} in {}",
        "Total:".bold(),
        format_size(total_size).green(),
        format_duration(total_time).green()
    );
}
