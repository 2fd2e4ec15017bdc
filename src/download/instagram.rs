//! Instagram handler backed by instaloader

use crate::core::{
    Credentials, DownloadOutcome, HandlerOptions, InstagramAuth, ProgressEvent, Source,
};
use crate::download::{new_files, snapshot_files, Handler, HandlerContext};
use crate::error::MultidlError;
use crate::session::{DEFAULT_SESSION_FILE, METADATA_FILE};
use crate::tools::Tool;
use crate::utils::{is_safe_filename, strip_query};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

fn shortcode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"instagram\.com/(?:p|reel|tv)/([\w-]+)").unwrap())
}

/// Post shortcode from a post, reel or tv link
pub fn instagram_shortcode(url: &str) -> Result<String> {
    shortcode_regex()
        .captures(strip_query(url.trim()))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MultidlError::InvalidUrl("Invalid Instagram link".to_string()))
}

/// Whether instaloader's failure means the post needs a logged-in session
pub fn is_login_block(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("400") || lower.contains("login") || lower.contains("authentication")
}

/// Contents of `instagram/meta.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstagramSessionMeta {
    pub username: String,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Session file plus the login it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct InstagramSession {
    pub username: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct InstagramHandler;

impl InstagramHandler {
    pub fn new() -> Self {
        Self
    }

    fn source_key(&self) -> &'static str {
        Source::Instagram.display_name()
    }

    fn session_filename(username: &str) -> String {
        format!("{}.session", username)
    }

    /// Find a cached session, preferring `<username>.session` over `session.bin`
    pub fn find_session(
        &self,
        ctx: &HandlerContext,
        username: Option<&str>,
    ) -> Result<Option<InstagramSession>> {
        let meta: Option<InstagramSessionMeta> = ctx.store.read_json(self.source_key(), METADATA_FILE);
        let Some(username) = username
            .map(str::to_string)
            .or_else(|| meta.map(|m| m.username))
        else {
            return Ok(None);
        };

        let named = ctx
            .store
            .path_for(self.source_key(), &Self::session_filename(&username))?;
        if named.is_file() {
            return Ok(Some(InstagramSession { username, path: named }));
        }

        let fallback = ctx.store.path_for(self.source_key(), DEFAULT_SESSION_FILE)?;
        if fallback.is_file() {
            return Ok(Some(InstagramSession { username, path: fallback }));
        }

        Ok(None)
    }

    /// instaloader arguments for one post
    pub fn build_args(
        &self,
        shortcode: &str,
        out_dir: &Path,
        session: Option<&InstagramSession>,
    ) -> Vec<String> {
        let mut args = vec![
            "--dirname-pattern".to_string(),
            out_dir.join(shortcode).to_string_lossy().into_owned(),
        ];

        if let Some(session) = session {
            args.push("--login".to_string());
            args.push(session.username.clone());
            args.push("--sessionfile".to_string());
            args.push(session.path.to_string_lossy().into_owned());
        }

        args.push("--".to_string());
        args.push(format!("-{}", shortcode));
        args
    }

    fn session_for_mode(
        &self,
        ctx: &HandlerContext,
        options: &HandlerOptions,
    ) -> Result<Option<InstagramSession>> {
        let username = options.instagram_username.as_deref();
        match options.instagram_auth {
            InstagramAuth::Unauthenticated => Ok(None),
            InstagramAuth::Auto => self.find_session(ctx, username),
            InstagramAuth::Authenticated => {
                self.find_session(ctx, username)?.map(Some).ok_or_else(|| {
                    MultidlError::AuthRequired(
                        "No Instagram session found. Log in first with `multidl auth instagram`"
                            .to_string(),
                    )
                })
            }
        }
    }

    fn write_meta(&self, ctx: &HandlerContext, username: &str) -> Result<()> {
        let meta = InstagramSessionMeta {
            username: username.to_string(),
            saved_at: Some(Utc::now()),
        };
        ctx.store.write_json(self.source_key(), METADATA_FILE, &meta)?;
        Ok(())
    }
}

#[async_trait]
impl Handler for InstagramHandler {
    fn source(&self) -> Source {
        Source::Instagram
    }

    async fn download(
        &self,
        ctx: &HandlerContext,
        url: &str,
        out_dir: &Path,
        options: &HandlerOptions,
    ) -> Result<DownloadOutcome> {
        let shortcode = instagram_shortcode(url)?;
        std::fs::create_dir_all(out_dir)?;

        let session = self.session_for_mode(ctx, options)?;
        match &session {
            Some(s) => info!("Using Instagram session for {}", s.username),
            None => debug!("Downloading Instagram post without a session"),
        }

        let args = self.build_args(&shortcode, out_dir, session.as_ref());
        ctx.emit(ProgressEvent::Started {
            source: Source::Instagram,
            url: url.to_string(),
        });

        let before = snapshot_files(out_dir);
        let args = &args;
        ctx.retry_executor()
            .execute(&shortcode, move || async move {
                let invocation = ctx.invocation(Tool::Instaloader, args.clone());
                match ctx.run_tool(Source::Instagram, url, invocation).await {
                    Err(MultidlError::ToolFailed { message, .. }) if is_login_block(&message) => {
                        warn!("Instagram refused {}: {}", url, message);
                        Err(MultidlError::AuthRequired(format!(
                            "Instagram blocked unauthenticated access for this post. \
                             Try authenticated mode. Original error: {}",
                            message
                        )))
                    }
                    other => other,
                }
            })
            .await?;

        info!("Downloaded Instagram post: {}", shortcode);
        Ok(DownloadOutcome {
            source: Source::Instagram,
            url: url.to_string(),
            files: new_files(&before, out_dir),
        })
    }

    async fn authenticate(&self, ctx: &HandlerContext, credentials: Credentials) -> Result<()> {
        match credentials {
            Credentials::SessionFile { username, path } => {
                let username = username.trim().to_string();
                if !is_safe_filename(&username) {
                    return Err(MultidlError::AuthRequired(format!(
                        "Invalid Instagram username: {:?}",
                        username
                    )));
                }

                let data = tokio::fs::read(&path).await?;
                let stored = ctx.store.write_binary(
                    self.source_key(),
                    &Self::session_filename(&username),
                    &data,
                )?;
                self.write_meta(ctx, &username)?;
                info!("Loaded Instagram session for {} into {}", username, stored.display());
                Ok(())
            }
            Credentials::Password { username, password } => {
                let username = username.trim().to_string();
                if !is_safe_filename(&username) {
                    return Err(MultidlError::AuthRequired(format!(
                        "Invalid Instagram username: {:?}",
                        username
                    )));
                }

                let session_path = ctx
                    .store
                    .path_for(self.source_key(), &Self::session_filename(&username))?;
                let args = vec![
                    "--login".to_string(),
                    username.clone(),
                    "--password".to_string(),
                    password,
                    "--sessionfile".to_string(),
                    session_path.to_string_lossy().into_owned(),
                ];

                info!("Attempting Instagram login for {}", username);
                // Inherit the terminal so instaloader can ask for a two-factor code
                let invocation = ctx.invocation(Tool::Instaloader, args).interactive(true);
                ctx.run_tool(Source::Instagram, "instagram login", invocation)
                    .await
                    .map_err(|e| match e {
                        MultidlError::ToolFailed { message, .. } => {
                            MultidlError::AuthRequired(format!("Instagram login failed: {}", message))
                        }
                        other => other,
                    })?;

                self.write_meta(ctx, &username)?;
                info!("Instagram login successful, session saved to {}", session_path.display());
                Ok(())
            }
            Credentials::Token(_) => Err(MultidlError::AuthRequired(
                "Instagram needs a password or an instaloader session file".to_string(),
            )),
        }
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

    const POST: &str = "https://www.instagram.com/p/C0ffee_12/?igsh=abc";

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
    fn test_instagram_shortcode() {
        assert_eq!(instagram_shortcode(POST).unwrap(), "C0ffee_12");
        assert_eq!(
            instagram_shortcode("https://instagram.com/reel/Xy-9/").unwrap(),
            "Xy-9"
        );
        assert_eq!(instagram_shortcode("https://www.instagram.com/tv/abc").unwrap(), "abc");

        let err = instagram_shortcode("https://www.instagram.com/someuser/").unwrap_err();
        assert!(matches!(err, MultidlError::InvalidUrl(msg) if msg == "Invalid Instagram link"));
    }

    #[test]
    fn test_is_login_block() {
        assert!(is_login_block("JSON Query to graphql/query: 400 Bad Request"));
        assert!(is_login_block("Login required to access this post"));
        assert!(is_login_block("Authentication failed"));
        assert!(!is_login_block("Connection reset by peer"));
    }

    #[test]
    fn test_build_args_with_session() {
        let session = InstagramSession {
            username: "alice".to_string(),
            path: PathBuf::from("/s/instagram/alice.session"),
        };
        let args = InstagramHandler::new().build_args("abc", Path::new("/out"), Some(&session));
        assert_eq!(
            args,
            vec![
                "--dirname-pattern",
                "/out/abc",
                "--login",
                "alice",
                "--sessionfile",
                "/s/instagram/alice.session",
                "--",
                "-abc",
            ]
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_download() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let ctx = context(dir.path(), runner.clone());

        let outcome = InstagramHandler::new()
            .download(&ctx, POST, &dir.path().join("out"), &HandlerOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.source, Source::Instagram);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, Tool::Instaloader);
        assert!(!calls[0].args.contains(&"--login".to_string()));
        assert_eq!(calls[0].args.last().unwrap(), "-C0ffee_12");
    }

    #[tokio::test]
    async fn test_authenticated_without_session_requires_auth() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let ctx = context(dir.path(), runner.clone());
        let options = HandlerOptions::default().with_instagram_auth(InstagramAuth::Authenticated);

        let err = InstagramHandler::new()
            .download(&ctx, POST, dir.path(), &options)
            .await
            .unwrap_err();

        assert!(err.is_auth_error());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auto_mode_without_session_runs_anonymously() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let ctx = context(dir.path(), runner.clone());
        let options = HandlerOptions::default().with_instagram_auth(InstagramAuth::Auto);

        let out_dir = dir.path().join("out");
        InstagramHandler::new()
            .download(&ctx, POST, &out_dir, &options)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].args.contains(&"--login".to_string()));
        assert!(!calls[0].args.contains(&"--sessionfile".to_string()));
        assert_eq!(calls[0].args[1], out_dir.join("C0ffee_12").to_string_lossy());
    }

    #[tokio::test]
    async fn test_auto_mode_uses_stored_session() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let ctx = context(dir.path(), runner.clone());
        let handler = InstagramHandler::new();

        let exported = dir.path().join("exported.session");
        std::fs::write(&exported, b"cookie-jar").unwrap();
        handler
            .authenticate(
                &ctx,
                Credentials::SessionFile {
                    username: "alice".to_string(),
                    path: exported,
                },
            )
            .await
            .unwrap();

        let options = HandlerOptions::default().with_instagram_auth(InstagramAuth::Auto);
        handler.download(&ctx, POST, dir.path(), &options).await.unwrap();

        let args = &runner.calls()[0].args;
        let login = args.iter().position(|a| a == "--login").unwrap();
        assert_eq!(args[login + 1], "alice");
        assert!(args.iter().any(|a| a.ends_with("alice.session")));
    }

    #[tokio::test]
    async fn test_login_block_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        runner.push_failure("ERROR: 400 Bad Request - login required");
        let ctx = context(dir.path(), runner.clone());

        let err = InstagramHandler::new()
            .download(&ctx, POST, dir.path(), &HandlerOptions::default())
            .await
            .unwrap_err();

        match err {
            MultidlError::AuthRequired(msg) => {
                assert!(msg.starts_with("Instagram blocked unauthenticated access"));
                assert!(msg.contains("400 Bad Request"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        runner.push_failure("ERROR: Connection reset by peer");
        let ctx = context(dir.path(), runner.clone());

        InstagramHandler::new()
            .download(&ctx, POST, dir.path(), &HandlerOptions::default())
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_password_login_runs_interactive_and_records_meta() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let ctx = context(dir.path(), runner.clone());

        InstagramHandler::new()
            .authenticate(
                &ctx,
                Credentials::Password {
                    username: "bob".to_string(),
                    password: "pw".to_string(),
                },
            )
            .await
            .unwrap();

        let calls = runner.calls();
        assert!(calls[0].interactive);
        assert_eq!(&calls[0].args[..2], &["--login", "bob"]);

        let meta: InstagramSessionMeta = ctx.store.read_json("Instagram", METADATA_FILE).unwrap();
        assert_eq!(meta.username, "bob");
        assert!(meta.saved_at.is_some());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_username() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeRunner::new()));

        let err = InstagramHandler::new()
            .authenticate(
                &ctx,
                Credentials::SessionFile {
                    username: "../evil".to_string(),
                    path: dir.path().join("x"),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
    }
}
