//! Per-request handler options and results

use crate::core::source::Source;
use std::path::PathBuf;

/// How Google Drive files are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMethod {
    /// Anonymous download through gdown
    #[default]
    Public,
    /// Drive REST API with a stored OAuth token
    Authenticated,
}

/// How Instagram posts are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstagramAuth {
    #[default]
    Unauthenticated,
    Authenticated,
    /// Use a cached session when the store has one
    Auto,
}

/// Options forwarded from the form, CLI or batch runner to a handler
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub drive_method: DriveMethod,
    pub instagram_auth: InstagramAuth,
    /// Login name used to locate an Instagram session file
    pub instagram_username: Option<String>,
    /// Reuse the session store's cookies.txt for yt-dlp sources
    pub use_session: bool,
    /// Explicit cookie file, takes precedence over the session store
    pub cookie_file: Option<PathBuf>,
    /// Raw arguments appended to the tool invocation
    pub extra_args: Vec<String>,
    pub verbose: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            drive_method: DriveMethod::Public,
            instagram_auth: InstagramAuth::Unauthenticated,
            instagram_username: None,
            use_session: true,
            cookie_file: None,
            extra_args: Vec::new(),
            verbose: false,
        }
    }
}

impl HandlerOptions {
    pub fn with_drive_method(mut self, method: DriveMethod) -> Self {
        self.drive_method = method;
        self
    }

    pub fn with_instagram_auth(mut self, auth: InstagramAuth) -> Self {
        self.instagram_auth = auth;
        self
    }

    pub fn with_instagram_username(mut self, username: impl Into<String>) -> Self {
        self.instagram_username = Some(username.into());
        self
    }

    pub fn with_use_session(mut self, use_session: bool) -> Self {
        self.use_session = use_session;
        self
    }

    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Credentials handed to a handler's authenticate step
#[derive(Clone)]
pub enum Credentials {
    /// Log in with a password; the tool may prompt for a two-factor code
    Password { username: String, password: String },
    /// Reuse a session file exported earlier
    SessionFile { username: String, path: PathBuf },
    /// Bearer token for a REST API
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::SessionFile { username, path } => f
                .debug_struct("SessionFile")
                .field("username", username)
                .field("path", path)
                .finish(),
            Credentials::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// Result of a successful handler call
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub source: Source,
    pub url: String,
    /// Files that appeared in the output directory during the call
    pub files: Vec<PathBuf>,
}
