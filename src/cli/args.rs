//! Command line argument parsing

use crate::core::{DriveMethod, InstagramAuth, Source};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// multidl - download media from Drive, Instagram and yt-dlp supported sites
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Download one or more URLs
    Download(DownloadArgs),
    /// Download every item of a scraper manifest
    Batch(BatchArgs),
    /// Interactive form
    Form(FormArgs),
    /// Cache credentials for a source
    Auth {
        #[command(subcommand)]
        target: AuthCommand,
    },
    /// Inspect and seed the session store
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
}

#[derive(ClapArgs, Debug, PartialEq)]
pub struct DownloadArgs {
    /// URLs to download
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Source to use instead of detecting it from the URL
    #[arg(short, long, value_name = "SOURCE")]
    pub source: Option<Source>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Google Drive download method
    #[arg(long, value_enum, default_value = "public")]
    pub drive_method: DriveMethodArg,

    /// Instagram authentication mode
    #[arg(long, value_enum, default_value = "unauthenticated")]
    pub instagram_auth: InstagramAuthArg,

    /// Instagram login whose cached session should be used
    #[arg(long, value_name = "USER")]
    pub username: Option<String>,

    /// Cookie file passed to yt-dlp instead of the session store's
    #[arg(long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// Do not reuse cookies from the session store
    #[arg(long)]
    pub no_session: bool,

    /// Per-tool timeout (e.g., 30m, 1h)
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<humantime::Duration>,

    /// Retries for transient tool failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// Extra arguments passed to the tool after `--`
    #[arg(last = true, value_name = "TOOL_ARGS")]
    pub extra_args: Vec<String>,
}

impl DownloadArgs {
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Into::into)
    }
}

impl Default for DownloadArgs {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            source: None,
            output: None,
            drive_method: DriveMethodArg::Public,
            instagram_auth: InstagramAuthArg::Unauthenticated,
            username: None,
            cookies: None,
            no_session: false,
            timeout: None,
            retries: None,
            extra_args: Vec::new(),
        }
    }
}

#[derive(ClapArgs, Debug, Default, PartialEq)]
pub struct BatchArgs {
    /// Path to grouped_by_source.json or grouped_by_source.csv
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Override the manifest format (json or csv)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Download destination directory
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Maximum total items to attempt
    #[arg(long)]
    pub limit: Option<usize>,

    /// Maximum items per source to attempt
    #[arg(long)]
    pub per_source_limit: Option<usize>,

    /// Only print actions without downloading
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum dispatches per minute
    #[arg(long, value_name = "N")]
    pub rate_per_minute: Option<u32>,
}

#[derive(ClapArgs, Debug, Default, PartialEq)]
pub struct FormArgs {
    /// Default output directory offered by the form
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum AuthCommand {
    /// Log in to Instagram or load an instaloader session file
    Instagram {
        #[arg(long)]
        username: String,

        /// Password; prompted for without echo when neither this nor
        /// --session-file is given
        #[arg(long, conflicts_with = "session_file")]
        password: Option<String>,

        /// Existing instaloader session file
        #[arg(long, value_name = "FILE")]
        session_file: Option<PathBuf>,
    },
    /// Store an OAuth access token for the Drive API
    GoogleDrive {
        #[arg(long)]
        token: String,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SessionCommand {
    /// Install a browser cookies.txt export for a source
    ImportCookies {
        source: Source,
        file: PathBuf,
    },
    /// List stored files for a source
    List { source: Source },
    /// Print the session directory for a source
    Path { source: Source },
}

/// Google Drive download method
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum DriveMethodArg {
    /// Anonymous download with gdown
    Public,
    /// Drive API with a stored token
    Authenticated,
}

impl From<DriveMethodArg> for DriveMethod {
    fn from(arg: DriveMethodArg) -> Self {
        match arg {
            DriveMethodArg::Public => DriveMethod::Public,
            DriveMethodArg::Authenticated => DriveMethod::Authenticated,
        }
    }
}

/// Instagram authentication mode
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum InstagramAuthArg {
    Unauthenticated,
    Authenticated,
    /// Use a cached session when one exists
    Auto,
}

impl From<InstagramAuthArg> for InstagramAuth {
    fn from(arg: InstagramAuthArg) -> Self {
        match arg {
            InstagramAuthArg::Unauthenticated => InstagramAuth::Unauthenticated,
            InstagramAuthArg::Authenticated => InstagramAuth::Authenticated,
            InstagramAuthArg::Auto => InstagramAuth::Auto,
        }
    }
}

impl Args {
    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    Normal,
    /// Verbose (tool output and debug info)
    Verbose,
}
