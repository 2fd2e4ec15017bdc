//! Progress events reported by handlers

use crate::core::source::Source;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Progress of a single tool invocation, parsed from its output
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Download progress as a percentage (0.0 to 100.0)
    pub percent: f64,
    /// Total size as printed by the tool (e.g. "12.34MiB")
    pub total: Option<String>,
    /// Current speed as printed by the tool
    pub speed: Option<String>,
    /// Estimated time remaining as printed by the tool
    pub eta: Option<String>,
}

/// Events posted from a running download to whoever is displaying it
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { source: Source, url: String },
    Progress { url: String, progress: Progress },
    /// Any other output line from the tool
    Message { url: String, line: String },
    Finished { url: String, files: Vec<PathBuf> },
    Failed { url: String, message: String },
}

/// Shared progress callback
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

fn ytdlp_progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(?P<total>\S+))?(?:\s+at\s+(?P<speed>\S+))?(?:\s+ETA\s+(?P<eta>\S+))?",
        )
        .expect("static regex")
    })
}

/// Parse a yt-dlp `--newline` progress line
///
/// `[download]  42.0% of   10.00MiB at    1.00MiB/s ETA 00:06`
pub fn parse_ytdlp_progress(line: &str) -> Option<Progress> {
    let caps = ytdlp_progress_regex().captures(line.trim())?;
    let percent = caps.name("pct")?.as_str().parse::<f64>().ok()?;
    let text = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().to_string())
            .filter(|value| value != "Unknown")
    };

    Some(Progress {
        percent,
        total: text("total"),
        speed: text("speed"),
        eta: text("eta"),
    })
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.ln() / THRESHOLD.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_progress_line() {
        let progress =
            parse_ytdlp_progress("[download]  42.0% of   10.00MiB at    1.00MiB/s ETA 00:06")
                .unwrap();
        assert_eq!(progress.percent, 42.0);
        assert_eq!(progress.total.as_deref(), Some("10.00MiB"));
        assert_eq!(progress.speed.as_deref(), Some("1.00MiB/s"));
        assert_eq!(progress.eta.as_deref(), Some("00:06"));
        assert!(progress.percent < 100.0);
    }

    #[test]
    fn test_parse_estimated_size_and_unknown_speed() {
        let progress =
            parse_ytdlp_progress("[download]   3.1% of ~  55.20MiB at  Unknown B/s ETA Unknown")
                .unwrap();
        assert_eq!(progress.percent, 3.1);
        assert_eq!(progress.total.as_deref(), Some("55.20MiB"));
        assert_eq!(progress.eta, None);
    }

    #[test]
    fn test_parse_finished_line() {
        let progress = parse_ytdlp_progress("[download] 100% of    4.20MiB in 00:00:02").unwrap();
        assert_eq!(progress.percent, 100.0);
    }

    #[test]
    fn test_non_progress_lines_are_ignored() {
        assert!(parse_ytdlp_progress("[download] Destination: clip.mp4").is_none());
        assert!(parse_ytdlp_progress("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_ytdlp_progress("").is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3660)), "1h 1m");
    }
}
