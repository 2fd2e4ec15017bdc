//! Source handlers and the plumbing they share

pub mod gdrive;
pub mod instagram;
pub mod retry;
pub mod ytdlp;

pub use gdrive::*;
pub use instagram::*;
pub use retry::*;
pub use ytdlp::*;

use crate::core::{
    parse_ytdlp_progress, Credentials, DownloadOutcome, HandlerOptions, ProgressCallback,
    ProgressEvent, Source,
};
use crate::error::MultidlError;
use crate::session::SessionStore;
use crate::tools::{LineSink, ProcessRunner, Tool, ToolInvocation, ToolOutput, ToolPaths, ToolRunner};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

/// Thin adapter that forwards a URL and options to one tool
#[async_trait]
pub trait Handler: Send + Sync {
    /// Source served by this handler
    fn source(&self) -> Source;

    /// Download `url` into `out_dir`
    async fn download(
        &self,
        ctx: &HandlerContext,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome>;

    /// Establish and cache a session for later downloads
    async fn authenticate(&self, _ctx: &HandlerContext, _credentials: Credentials) -> Result<()> {
        Err(MultidlError::AuthUnsupported(self.source().to_string()))
    }
}

/// Everything a handler needs besides its own options
#[derive(Clone)]
pub struct HandlerContext {
    pub store: SessionStore,
    pub tools: ToolPaths,
    pub runner: Arc<dyn ToolRunner>,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub progress: Option<ProgressCallback>,
    pub http: reqwest::Client,
}

impl HandlerContext {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            tools: ToolPaths::default(),
            runner: Arc::new(ProcessRunner::new()),
            timeout: Duration::from_secs(30 * 60),
            retry: RetryConfig::default(),
            progress: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    pub fn retry_executor(&self) -> RetryExecutor {
        RetryExecutor::with_config(self.retry.clone())
    }

    /// Build an invocation for `tool` with the configured path and timeout
    pub fn invocation(&self, tool: Tool, args: Vec<String>) -> ToolInvocation {
        ToolInvocation::new(tool, self.tools.resolve(tool), args).with_timeout(self.timeout)
    }

    /// Sink translating tool output for `url` into progress events
    fn line_sink(&self, url: &str) -> LineSink {
        let progress = self.progress.clone();
        let url = url.to_string();
        Arc::new(move |line: &str| {
            let Some(progress) = &progress else {
                return;
            };
            let event = match parse_ytdlp_progress(line) {
                Some(parsed) => ProgressEvent::Progress {
                    url: url.clone(),
                    progress: parsed,
                },
                None => ProgressEvent::Message {
                    url: url.clone(),
                    line: line.to_string(),
                },
            };
            progress(event);
        })
    }

    /// Run a tool on behalf of `source`; a non-zero exit becomes `ToolFailed`
    pub async fn run_tool(
        &self,
        source: Source,
        url: &str,
        invocation: ToolInvocation,
    ) -> Result<ToolOutput> {
        let tool = invocation.tool;
        let output = self.runner.run(invocation, self.line_sink(url)).await?;
        if output.success {
            Ok(output)
        } else {
            Err(MultidlError::ToolFailed {
                tool: tool.to_string(),
                source_name: source.to_string(),
                message: output.failure_message(),
            })
        }
    }
}

/// All regular files currently below `dir`
pub fn snapshot_files(dir: &Path) -> HashSet<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Files below `dir` that are not in `before`, sorted
pub fn new_files(before: &HashSet<PathBuf>, dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = snapshot_files(dir)
        .into_iter()
        .filter(|path| !before.contains(path))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::runner::testing::FakeRunner;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_new_files_detects_additions() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.mp4"), b"x").unwrap();
        let before = snapshot_files(dir.path());

        std::fs::create_dir_all(dir.path().join("youtube/chan")).unwrap();
        std::fs::write(dir.path().join("youtube/chan/new.mp4"), b"y").unwrap();

        let added = new_files(&before, dir.path());
        assert_eq!(added, vec![dir.path().join("youtube/chan/new.mp4")]);
    }

    #[test]
    fn test_snapshot_of_missing_dir_is_empty() {
        assert!(snapshot_files(Path::new("/no/such/dir/for/multidl")).is_empty());
    }

    #[tokio::test]
    async fn test_run_tool_emits_progress_and_maps_failure() {
        let dir = TempDir::new().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let runner = Arc::new(FakeRunner::new().with_lines(&[
            "[download]  50.0% of 2.00MiB at 1.00MiB/s ETA 00:01",
            "[download] Destination: a.mp4",
        ]));
        runner.push_failure("ERROR: Unsupported URL: https://example.com");

        let mut ctx = HandlerContext::new(SessionStore::new(dir.path()));
        ctx.runner = runner.clone();
        ctx.progress = Some(Arc::new(move |event: ProgressEvent| events_clone.lock().unwrap().push(event)));

        let invocation = ctx.invocation(Tool::YtDlp, vec!["x".to_string()]);
        let err = ctx
            .run_tool(Source::Reddit, "https://example.com", invocation)
            .await
            .unwrap_err();

        match err {
            MultidlError::ToolFailed { tool, source_name, message } => {
                assert_eq!(tool, "yt-dlp");
                assert_eq!(source_name, "Reddit");
                assert!(message.contains("Unsupported URL"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ProgressEvent::Progress { progress, .. } if progress.percent == 50.0));
        assert!(matches!(&events[1], ProgressEvent::Message { line, .. } if line.contains("Destination")));
    }

    #[tokio::test]
    async fn test_default_authenticate_is_unsupported() {
        struct Plain;

        #[async_trait]
        impl Handler for Plain {
            fn source(&self) -> Source {
                Source::Reddit
            }

            async fn download(
                &self,
                _ctx: &HandlerContext,
                url: &str,
                _out_dir: &Path,
                _options: &HandlerOptions,
            ) -> Result<DownloadOutcome> {
                Ok(DownloadOutcome {
                    source: Source::Reddit,
                    url: url.to_string(),
                    files: Vec::new(),
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let ctx = HandlerContext::new(SessionStore::new(dir.path()));
        let err = Plain
            .authenticate(&ctx, Credentials::Token("t".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, MultidlError::AuthUnsupported(name) if name == "Reddit"));
    }
}
