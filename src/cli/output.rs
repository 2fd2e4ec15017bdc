//! Output formatting and progress display

use crate::batch::BatchReport;
use crate::cli::args::VerbosityLevel;
use crate::core::{format_duration, DownloadOutcome, Progress, ProgressEvent};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Output formatter for multidl
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    progress_bar: Mutex<Option<ProgressBar>>,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Mutex::new(None),
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    fn bar(&self) -> Option<ProgressBar> {
        self.progress_bar.lock().ok().and_then(|bar| bar.clone())
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.progress_bar.lock().ok().and_then(|mut bar| bar.take())
    }

    /// Create a percentage bar for one download
    pub fn create_progress_bar(&self, label: &str) -> Option<ProgressBar> {
        if self.verbosity == VerbosityLevel::Quiet {
            return None;
        }

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let progress_bar = ProgressBar::new(100);
        progress_bar.set_style(style);
        progress_bar.set_message(label.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(120));

        if let Ok(mut slot) = self.progress_bar.lock() {
            if let Some(previous) = slot.replace(progress_bar.clone()) {
                previous.finish_and_clear();
            }
        }
        Some(progress_bar)
    }

    /// Update progress bar
    pub fn update_progress(&self, progress: &Progress) {
        if let Some(progress_bar) = self.bar() {
            progress_bar.set_position(progress.percent.clamp(0.0, 100.0) as u64);

            let details: Vec<String> = [
                progress.total.as_ref().map(|t| format!("of {}", t)),
                progress.speed.as_ref().map(|s| format!("at {}", s)),
                progress.eta.as_ref().map(|e| format!("ETA {}", e)),
            ]
            .into_iter()
            .flatten()
            .collect();
            if !details.is_empty() {
                progress_bar.set_message(details.join(" "));
            }
        }
    }

    /// Finish progress bar
    pub fn finish_progress(&self) {
        if let Some(progress_bar) = self.take_bar() {
            progress_bar.finish_and_clear();
        }
    }

    /// Render one event from a running download
    pub fn handle_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { source, url } => {
                self.create_progress_bar(&format!("{}: {}", source, url));
            }
            ProgressEvent::Progress { progress, .. } => self.update_progress(progress),
            ProgressEvent::Message { line, .. } => {
                if self.verbosity == VerbosityLevel::Verbose {
                    match self.bar() {
                        Some(bar) => bar.println(line),
                        None => println!("{}", line.dimmed()),
                    }
                }
            }
            ProgressEvent::Finished { url, files } => {
                self.finish_progress();
                self.success(&format!("Downloaded {}", url));
                self.print_files(files);
            }
            ProgressEvent::Failed { url, message } => {
                if let Some(bar) = self.take_bar() {
                    bar.abandon();
                }
                self.error(&format!("{}: {}", url, message));
            }
        }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("ℹ️  {}", message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("✅ {}", message.green());
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("⚠️  {}", message.yellow());
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("❌ {}", message.red());
    }

    /// Print new files relative to the working directory
    pub fn print_files(&self, files: &[std::path::PathBuf]) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }
        let cwd = std::env::current_dir().unwrap_or_default();
        for file in files {
            println!("   💾 {}", display_path(file, &cwd));
        }
    }

    /// Print download start message
    pub fn print_download_start(&self, url: &str, output_dir: &Path) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!("🚀 Starting download...");
        println!("🔗 URL: {}", url);
        println!("💾 Output: {}", output_dir.display());
    }

    /// Print download complete message
    pub fn print_download_complete(&self, outcome: &DownloadOutcome, duration: Duration) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!(
            "⏱️  {} finished in {} ({} new files)",
            outcome.source,
            format_duration(duration),
            outcome.files.len()
        );
    }

    /// Print the outcome of a batch run
    pub fn print_batch_report(&self, report: &BatchReport, dry_run: bool) {
        if self.verbosity != VerbosityLevel::Quiet {
            let verb = if dry_run { "Would download" } else { "Downloaded" };
            for (source, url) in &report.completed {
                println!("  {} {} [{}] {}", "✓".green(), verb, source, url);
            }
            for (hint, url, reason) in &report.skipped {
                let hint = if hint.is_empty() { "-" } else { hint.as_str() };
                println!("  {} Skipped [{}] {} ({})", "-".yellow(), hint, url, reason);
            }
        }

        for (source, url, message) in &report.errors {
            eprintln!("  {} [{}] {}: {}", "✗".red(), source, url, message);
        }

        let summary = report.summary();
        if report.has_errors() {
            self.error(&summary);
            self.error("Some downloads failed. See log for details.");
        } else if self.verbosity != VerbosityLevel::Quiet {
            println!("📊 {}", summary.bold());
        }
    }
}

/// Create a progress callback for the downloader
pub fn create_progress_callback(
    formatter: Arc<OutputFormatter>,
) -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event: ProgressEvent| {
        formatter.handle_event(&event);
    }
}

/// `path` relative to `base` when that is shorter to read
pub fn display_path(path: &Path, base: &Path) -> String {
    match pathdiff::diff_paths(path, base) {
        Some(relative) if !relative.starts_with("..") => relative.display().to_string(),
        _ => path.display().to_string(),
    }
}
