//! yt-dlp backed handler shared by the video sources

use crate::core::{DownloadOutcome, HandlerOptions, ProgressEvent, Source};
use crate::download::{new_files, snapshot_files, Handler, HandlerContext};
use crate::tools::Tool;
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

/// Output template, relative to the output directory, for a yt-dlp source
pub fn output_template(source: Source) -> &'static str {
    match source {
        Source::YouTube => "youtube/%(channel)s/%(title)s [%(id)s].%(ext)s",
        Source::Twitter => "twitter/%(uploader_id)s/%(upload_date)s_%(id)s.%(ext)s",
        Source::Reddit => "reddit/%(uploader)s/%(title)s [%(id)s].%(ext)s",
        Source::Facebook => "facebook/%(uploader)s/%(title)s [%(id)s].%(ext)s",
        Source::TikTok => "%(title)s.%(ext)s",
        _ => DEFAULT_TEMPLATE,
    }
}

/// Handler wrapping yt-dlp with cookie/session persistence
#[derive(Debug, Clone)]
pub struct YtDlpHandler {
    source: Source,
    template: &'static str,
}

impl YtDlpHandler {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            template: output_template(source),
        }
    }

    /// Cookie file for this call: explicit override, else the store's
    /// cookies.txt when sessions are enabled
    pub fn resolve_cookie_path(
        &self,
        ctx: &HandlerContext,
        options: &HandlerOptions,
    ) -> Result<Option<PathBuf>> {
        if let Some(path) = &options.cookie_file {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            return Ok(Some(path.clone()));
        }

        if !options.use_session {
            return Ok(None);
        }

        Ok(Some(ctx.store.default_cookie_path(self.source.display_name())?))
    }

    /// yt-dlp argument vector for one URL
    pub fn build_args(
        &self,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
        cookie_path: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            out_dir.join(self.template).to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--retries".to_string(),
            "2".to_string(),
            "--concurrent-fragments".to_string(),
            "2".to_string(),
            "--newline".to_string(),
        ];

        if !options.verbose {
            args.push("--quiet".to_string());
            args.push("--no-warnings".to_string());
            args.push("--progress".to_string());
        }

        if let Some(path) = cookie_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        args.extend(options.extra_args.iter().cloned());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl Handler for YtDlpHandler {
    fn source(&self) -> Source {
        self.source
    }

    async fn download(
        &self,
        ctx: &HandlerContext,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome> {
        std::fs::create_dir_all(out_dir)?;

        let cookie_path = self.resolve_cookie_path(ctx, options)?;
        let args = self.build_args(url, out_dir, options, cookie_path.as_deref());
        debug!("yt-dlp args: {:?}", args);

        info!("yt-dlp download start: source={} url={}", self.source, url);
        ctx.emit(ProgressEvent::Started {
            source: self.source,
            url: url.to_string(),
        });

        let before = snapshot_files(out_dir);
        let label = format!("{} {}", self.source, url);
        ctx.retry_executor()
            .execute(&label, move || {
                let invocation = ctx.invocation(Tool::YtDlp, args.clone());
                ctx.run_tool(self.source, url, invocation)
            })
            .await?;

        let files = new_files(&before, out_dir);
        info!("yt-dlp download complete: {} ({} files)", url, files.len());

        Ok(DownloadOutcome {
            source: self.source,
            url: url.to_string(),
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::RetryConfig;
    use crate::error::MultidlError;
    use crate::session::SessionStore;
    use crate::tools::runner::testing::FakeRunner;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn context(dir: &Path, runner: Arc<FakeRunner>) -> HandlerContext {
        let mut ctx = HandlerContext::new(SessionStore::new(dir.join("sessions")));
        ctx.runner = runner;
        ctx.retry = RetryConfig {
            initial_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            ..RetryConfig::default()
        };
        ctx
    }

    #[test]
    fn test_output_templates() {
        assert_eq!(
            output_template(Source::YouTube),
            "youtube/%(channel)s/%(title)s [%(id)s].%(ext)s"
        );
        assert_eq!(output_template(Source::TikTok), "%(title)s.%(ext)s");
        assert_eq!(output_template(Source::Threads), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_build_args_quiet_with_cookies() {
        let handler = YtDlpHandler::new(Source::Twitter);
        let options = HandlerOptions::default();
        let args = handler.build_args(
            "https://x.com/a/status/1",
            Path::new("/out"),
            &options,
            Some(Path::new("/s/twitter/cookies.txt")),
        );

        assert_eq!(args[0], "-o");
        assert_eq!(
            args[1],
            "/out/twitter/%(uploader_id)s/%(upload_date)s_%(id)s.%(ext)s"
        );
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--quiet".to_string()));
        let cookies = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[cookies + 1], "/s/twitter/cookies.txt");
        assert_eq!(args.last().unwrap(), "https://x.com/a/status/1");
    }

    #[test]
    fn test_build_args_verbose_and_extra() {
        let handler = YtDlpHandler::new(Source::Reddit);
        let mut options = HandlerOptions::default().with_verbose(true);
        options.extra_args = vec!["-f".to_string(), "best".to_string()];
        let args = handler.build_args("https://redd.it/x", Path::new("/out"), &options, None);

        assert!(!args.contains(&"--quiet".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
        let n = args.len();
        assert_eq!(&args[n - 3..], &["-f", "best", "https://redd.it/x"]);
    }

    #[test]
    fn test_cookie_resolution() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeRunner::new()));
        let handler = YtDlpHandler::new(Source::Facebook);

        let from_store = handler
            .resolve_cookie_path(&ctx, &HandlerOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(
            from_store,
            dir.path().join("sessions").join("facebook").join("cookies.txt")
        );

        let none = handler
            .resolve_cookie_path(&ctx, &HandlerOptions::default().with_use_session(false))
            .unwrap();
        assert!(none.is_none());

        let explicit = dir.path().join("mine").join("c.txt");
        let chosen = handler
            .resolve_cookie_path(
                &ctx,
                &HandlerOptions::default()
                    .with_use_session(false)
                    .with_cookie_file(&explicit),
            )
            .unwrap()
            .unwrap();
        assert_eq!(chosen, explicit);
        assert!(dir.path().join("mine").is_dir());
    }

    #[tokio::test]
    async fn test_download_retries_once_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        runner.push_failure("ERROR: HTTP Error 503");
        let ctx = context(dir.path(), runner.clone());

        let out = dir.path().join("out");
        let outcome = YtDlpHandler::new(Source::TikTok)
            .download(&ctx, "https://www.tiktok.com/@u/video/1", &out, &HandlerOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.source, Source::TikTok);
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(runner.calls()[0].tool, Tool::YtDlp);
        assert!(out.is_dir());
    }

    #[tokio::test]
    async fn test_download_gives_up_after_two_attempts() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        runner.push_failure("ERROR: first");
        runner.push_failure("ERROR: second");
        let ctx = context(dir.path(), runner.clone());

        let err = YtDlpHandler::new(Source::YouTube)
            .download(&ctx, "https://youtu.be/abc", dir.path(), &HandlerOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MultidlError::ToolFailed { ref message, .. } if message == "ERROR: second"));
        assert_eq!(runner.calls().len(), 2);
    }
}
