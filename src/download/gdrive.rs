//! Google Drive handler: public files via gdown, authenticated via the Drive REST API

use crate::core::{
    format_bytes, Credentials, DownloadOutcome, DriveMethod, HandlerOptions, Progress,
    ProgressEvent, Source,
};
use crate::download::{new_files, snapshot_files, Handler, HandlerContext};
use crate::error::MultidlError;
use crate::tools::Tool;
use crate::utils::{generate_unique_filename, to_safe_filename};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// What a Drive link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveTarget {
    File,
    Folder,
}

fn drive_patterns() -> &'static [(Regex, DriveTarget); 3] {
    static PATTERNS: OnceLock<[(Regex, DriveTarget); 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (Regex::new(r"(?:/d/|id=)([\w-]+)").unwrap(), DriveTarget::File),
            (
                Regex::new(r"(?:folders/|folderview\?id=)([\w-]+)").unwrap(),
                DriveTarget::Folder,
            ),
            (Regex::new(r"uc\?id=([\w-]+)").unwrap(), DriveTarget::File),
        ]
    })
}

/// Extract the file or folder id from a Drive share link
pub fn parse_drive_id(url: &str) -> Option<(String, DriveTarget)> {
    drive_patterns().iter().find_map(|(pattern, target)| {
        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| (m.as_str().to_string(), *target))
    })
}

/// OAuth token cached in the session store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    name: Option<String>,
    original_filename: Option<String>,
}

/// Google Drive handler
#[derive(Debug, Clone)]
pub struct GoogleDriveHandler {
    api_base: String,
}

impl Default for GoogleDriveHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleDriveHandler {
    pub fn new() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
        }
    }

    /// Point the REST calls at another base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn source_key(&self) -> &'static str {
        Source::GoogleDrive.display_name()
    }

    fn load_credentials(&self, ctx: &HandlerContext) -> Result<DriveCredentials> {
        ctx.store
            .read_json::<DriveCredentials>(self.source_key(), CREDENTIALS_FILE)
            .filter(|creds| !creds.access_token.trim().is_empty())
            .ok_or_else(|| {
                MultidlError::AuthRequired(
                    "no Google Drive token stored; run `multidl auth google-drive --token <TOKEN>`"
                        .to_string(),
                )
            })
    }

    async fn download_public(
        &self,
        ctx: &HandlerContext,
        url: &str,
        id: &str,
        target: DriveTarget,
        out_dir: &Path,
    ) -> Result<()> {
        let args = match target {
            DriveTarget::File => {
                info!("Downloading public drive file: {} into {}", url, out_dir.display());
                vec![
                    "--fuzzy".to_string(),
                    url.to_string(),
                    "-O".to_string(),
                    format!("{}{}", out_dir.display(), std::path::MAIN_SEPARATOR),
                ]
            }
            DriveTarget::Folder => {
                info!("Downloading Google Drive folder: {} into {}", id, out_dir.display());
                vec![
                    "--folder".to_string(),
                    format!("https://drive.google.com/drive/folders/{}", id),
                    "-O".to_string(),
                    out_dir.display().to_string(),
                ]
            }
        };

        let invocation = ctx.invocation(Tool::Gdown, args);
        ctx.run_tool(Source::GoogleDrive, url, invocation).await?;
        Ok(())
    }

    fn check_auth(status: StatusCode) -> Result<()> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MultidlError::AuthRequired(format!(
                "Google Drive rejected the stored token ({})",
                status
            )));
        }
        Ok(())
    }

    async fn fetch_name(&self, ctx: &HandlerContext, token: &str, id: &str) -> Result<String> {
        let response = ctx
            .http
            .get(format!("{}/files/{}", self.api_base, id))
            .query(&[("fields", "name,originalFilename"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_auth(response.status())?;
        let metadata: FileMetadata = response.error_for_status()?.json().await?;

        let name = metadata
            .name
            .or(metadata.original_filename)
            .unwrap_or_else(|| id.to_string());
        Ok(to_safe_filename(&name, ""))
    }

    async fn fetch_content(
        &self,
        ctx: &HandlerContext,
        url: &str,
        token: &str,
        id: &str,
        target: &Path,
    ) -> Result<u64> {
        let response = ctx
            .http
            .get(format!("{}/files/{}", self.api_base, id))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_auth(response.status())?;
        let response = response.error_for_status()?;
        let total = response.content_length();

        let mut file = tokio::fs::File::create(target).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if let Some(total) = total.filter(|t| *t > 0) {
                ctx.emit(ProgressEvent::Progress {
                    url: url.to_string(),
                    progress: Progress {
                        percent: written as f64 / total as f64 * 100.0,
                        total: Some(format_bytes(total)),
                        speed: None,
                        eta: None,
                    },
                });
            }
        }
        file.flush().await?;
        Ok(written)
    }

    async fn download_authenticated(
        &self,
        ctx: &HandlerContext,
        url: &str,
        id: &str,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let credentials = self.load_credentials(ctx)?;
        info!("Starting authenticated Google Drive download for {}", id);

        let token = credentials.access_token.as_str();
        let label = format!("Google Drive file {}", id);
        ctx.retry_executor()
            .execute(&label, move || async move {
                let name = self.fetch_name(ctx, token, id).await?;
                let name = generate_unique_filename(out_dir, &name)?;
                let target = out_dir.join(&name);
                match self.fetch_content(ctx, url, token, id, &target).await {
                    Ok(bytes) => {
                        info!("Downloaded (authenticated) {} ({})", name, format_bytes(bytes));
                        Ok(target)
                    }
                    Err(e) => {
                        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                            if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                                warn!("Could not remove partial {}: {}", target.display(), remove_err);
                            }
                        }
                        Err(e)
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl Handler for GoogleDriveHandler {
    fn source(&self) -> Source {
        Source::GoogleDrive
    }

    async fn download(
        &self,
        ctx: &HandlerContext,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome> {
        if url.trim().is_empty() {
            return Err(MultidlError::InvalidUrl(
                "A valid Google Drive URL must be provided".to_string(),
            ));
        }
        std::fs::create_dir_all(out_dir)?;

        let (id, target) = parse_drive_id(url)
            .ok_or_else(|| MultidlError::InvalidUrl("Invalid Google Drive URL".to_string()))?;

        ctx.emit(ProgressEvent::Started {
            source: Source::GoogleDrive,
            url: url.to_string(),
        });

        let before = snapshot_files(out_dir);
        match (target, options.drive_method) {
            (DriveTarget::File, DriveMethod::Authenticated) => {
                self.download_authenticated(ctx, url, &id, out_dir).await?;
            }
            (DriveTarget::Folder, DriveMethod::Authenticated) => {
                warn!("Folders are always fetched through gdown; ignoring authenticated mode");
                self.download_public(ctx, url, &id, target, out_dir).await?;
            }
            _ => self.download_public(ctx, url, &id, target, out_dir).await?,
        }

        Ok(DownloadOutcome {
            source: Source::GoogleDrive,
            url: url.to_string(),
            files: new_files(&before, out_dir),
        })
    }

    async fn authenticate(&self, ctx: &HandlerContext, credentials: Credentials) -> Result<()> {
        let Credentials::Token(token) = credentials else {
            return Err(MultidlError::AuthRequired(
                "Google Drive needs an OAuth access token".to_string(),
            ));
        };

        let stored = DriveCredentials {
            access_token: token.trim().to_string(),
            saved_at: Some(Utc::now()),
        };
        let path = ctx.store.write_json(self.source_key(), CREDENTIALS_FILE, &stored)?;
        info!("Stored Google Drive token in {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::RetryConfig;
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
    fn test_parse_drive_id() {
        assert_eq!(
            parse_drive_id("https://drive.google.com/file/d/1AbC-_x/view?usp=sharing"),
            Some(("1AbC-_x".to_string(), DriveTarget::File))
        );
        assert_eq!(
            parse_drive_id("https://drive.google.com/open?id=XYZ123"),
            Some(("XYZ123".to_string(), DriveTarget::File))
        );
        assert_eq!(
            parse_drive_id("https://drive.google.com/drive/folders/FOLDER_1"),
            Some(("FOLDER_1".to_string(), DriveTarget::Folder))
        );
        // "id=" is tried before the folderview pattern
        assert_eq!(
            parse_drive_id("https://drive.google.com/folderview?id=F2"),
            Some(("F2".to_string(), DriveTarget::File))
        );
        assert_eq!(parse_drive_id("https://drive.google.com/"), None);
    }

    #[tokio::test]
    async fn test_invalid_urls() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeRunner::new()));
        let handler = GoogleDriveHandler::new();
        let options = HandlerOptions::default();

        let err = handler.download(&ctx, "  ", dir.path(), &options).await.unwrap_err();
        assert!(matches!(err, MultidlError::InvalidUrl(ref m) if m.contains("must be provided")));

        let err = handler
            .download(&ctx, "https://drive.google.com/", dir.path(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, MultidlError::InvalidUrl(ref m) if m == "Invalid Google Drive URL"));
    }

    #[tokio::test]
    async fn test_public_file_uses_gdown_fuzzy() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let ctx = context(dir.path(), runner.clone());
        let url = "https://drive.google.com/file/d/abc/view";

        GoogleDriveHandler::new()
            .download(&ctx, url, dir.path(), &HandlerOptions::default())
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, Tool::Gdown);
        assert_eq!(calls[0].args[0], "--fuzzy");
        assert_eq!(calls[0].args[1], url);
        assert!(calls[0].args[3].ends_with(std::path::MAIN_SEPARATOR));
    }

    #[tokio::test]
    async fn test_folder_uses_gdown_folder_even_when_authenticated() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let ctx = context(dir.path(), runner.clone());

        GoogleDriveHandler::new()
            .download(
                &ctx,
                "https://drive.google.com/drive/folders/F1",
                dir.path(),
                &HandlerOptions::default().with_drive_method(DriveMethod::Authenticated),
            )
            .await
            .unwrap();

        let args = &runner.calls()[0].args;
        assert_eq!(args[0], "--folder");
        assert_eq!(args[1], "https://drive.google.com/drive/folders/F1");
    }

    #[tokio::test]
    async fn test_authenticated_without_token_requires_auth() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeRunner::new()));

        let err = GoogleDriveHandler::new()
            .download(
                &ctx,
                "https://drive.google.com/file/d/abc/view",
                dir.path(),
                &HandlerOptions::default().with_drive_method(DriveMethod::Authenticated),
            )
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
    }

    #[tokio::test]
    async fn test_authenticated_download_via_rest_api() {
        let mut server = mockito::Server::new_async().await;
        let meta = server
            .mock("GET", "/files/abc")
            .match_query(mockito::Matcher::UrlEncoded("fields".into(), "name,originalFilename".into()))
            .match_header("authorization", "Bearer tok")
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "report: final.pdf"}"#)
            .create_async()
            .await;
        let media = server
            .mock("GET", "/files/abc")
            .match_query(mockito::Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("authorization", "Bearer tok")
            .with_body("PDFDATA")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeRunner::new()));
        let handler = GoogleDriveHandler::new().with_api_base(server.url());
        handler
            .authenticate(&ctx, Credentials::Token("tok".to_string()))
            .await
            .unwrap();

        let out = dir.path().join("out");
        let outcome = handler
            .download(
                &ctx,
                "https://drive.google.com/file/d/abc/view",
                &out,
                &HandlerOptions::default().with_drive_method(DriveMethod::Authenticated),
            )
            .await
            .unwrap();

        meta.assert_async().await;
        media.assert_async().await;
        let saved = out.join("report_ final.pdf");
        assert_eq!(std::fs::read_to_string(&saved).unwrap(), "PDFDATA");
        assert_eq!(outcome.files, vec![saved]);
    }

    #[tokio::test]
    async fn test_rejected_token_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _meta = server
            .mock("GET", "/files/abc")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeRunner::new()));
        let handler = GoogleDriveHandler::new().with_api_base(server.url());
        handler
            .authenticate(&ctx, Credentials::Token("expired".to_string()))
            .await
            .unwrap();

        let err = handler
            .download(
                &ctx,
                "https://drive.google.com/file/d/abc/view",
                dir.path(),
                &HandlerOptions::default().with_drive_method(DriveMethod::Authenticated),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MultidlError::AuthRequired(_)));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_password_credentials() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeRunner::new()));
        let err = GoogleDriveHandler::new()
            .authenticate(
                &ctx,
                Credentials::Password {
                    username: "a".to_string(),
                    password: "b".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
    }
}
