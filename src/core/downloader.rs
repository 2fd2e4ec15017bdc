//! Dispatch table from sources to handlers

use crate::config::AppConfig;
use crate::core::{Credentials, DownloadOutcome, HandlerOptions, ProgressEvent, Source};
use crate::download::{
    GoogleDriveHandler, Handler, HandlerContext, InstagramHandler, RetryConfig, YtDlpHandler,
};
use crate::error::MultidlError;
use crate::session::SessionStore;
use crate::tools::{ToolPaths, ToolRunner};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Anything that can forward one URL to a handler
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        source: Source,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome>;
}

/// Main downloader struct
pub struct Downloader {
    handlers: HashMap<Source, Arc<dyn Handler>>,
    ctx: HandlerContext,
    output_path: PathBuf,
}

impl Downloader {
    /// Create a downloader with every built-in handler registered
    pub fn new() -> Self {
        let mut downloader = Self::empty();
        downloader.register(Arc::new(GoogleDriveHandler::new()));
        downloader.register(Arc::new(InstagramHandler::new()));
        for source in Source::ALL.into_iter().filter(Source::uses_ytdlp) {
            downloader.register(Arc::new(YtDlpHandler::new(source)));
        }
        downloader
    }

    /// Create a downloader without handlers
    pub fn empty() -> Self {
        let config = AppConfig::default();
        Self {
            handlers: HashMap::new(),
            ctx: HandlerContext::new(SessionStore::new(config.session_dir)),
            output_path: config.output_dir,
        }
    }

    /// Build from loaded configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new()
            .with_output_path(&config.output_dir)
            .with_session_store(SessionStore::new(&config.session_dir))
            .with_tools(config.tools.clone())
            .with_timeout(config.timeout())
            .with_max_retries(config.max_retries)
    }

    /// Register (or replace) the handler for its source
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.source(), handler);
    }

    /// Sources with a registered handler, in menu order
    pub fn sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|source| self.handlers.contains_key(source))
            .collect()
    }

    /// Set output directory
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.ctx.store = store;
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.ctx.tools = tools;
        self
    }

    /// Set per-invocation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.ctx.timeout = timeout;
        self
    }

    /// Set maximum retries for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.ctx.retry.max_retries = max_retries;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.ctx.retry = retry;
        self
    }

    /// Set progress callback
    pub fn with_progress(mut self, callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.ctx.progress = Some(Arc::new(callback));
        self
    }

    /// Replace the process runner used for tool calls
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.ctx.runner = runner;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.ctx.store
    }

    fn handler(&self, source: Source) -> Result<&Arc<dyn Handler>> {
        self.handlers
            .get(&source)
            .ok_or_else(|| MultidlError::UnknownSource(source.to_string()))
    }

    /// Download `url` into the configured output directory
    pub async fn download(
        &self,
        source: Source,
        url: &str,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome> {
        self.download_to(source, url, &self.output_path, options).await
    }

    /// Download `url` into `out_dir`
    pub async fn download_to(
        &self,
        source: Source,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome> {
        let handler = self.handler(source)?;
        tokio::fs::create_dir_all(out_dir).await?;

        info!("Dispatching {} to {} handler", url, source);
        match handler.download(&self.ctx, url, out_dir, options).await {
            Ok(outcome) => {
                self.ctx.emit(ProgressEvent::Finished {
                    url: url.to_string(),
                    files: outcome.files.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                error!("{} download failed for {}: {}", source, url, e);
                self.ctx.emit(ProgressEvent::Failed {
                    url: url.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Cache credentials for `source`
    pub async fn authenticate(&self, source: Source, credentials: Credentials) -> Result<()> {
        let handler = self.handler(source)?;
        info!("Authenticating {}", source);
        handler.authenticate(&self.ctx, credentials).await
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatch for Downloader {
    async fn dispatch(
        &self,
        source: Source,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome> {
        self.download_to(source, url, out_dir, options).await
    }
}
