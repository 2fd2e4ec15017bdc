//! # multidl - multi-source media downloader
//!
//! Front-end that forwards URLs to the right external downloader:
//! yt-dlp for YouTube, TikTok, Twitter/X, Reddit, Facebook and Threads,
//! gdown or the Drive REST API for Google Drive, and instaloader for
//! Instagram.
//!
//! ## Features
//!
//! - Source detection from URL hosts and manifest labels
//! - Cookie and session caching per source
//! - Batch downloads from JSON/CSV manifests with count limits
//! - Interactive terminal form
//!
//! ## Example
//!
//! ```rust,no_run
//! use multidl::{Downloader, HandlerOptions, Source};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = Downloader::new().with_output_path("./downloads");
//!
//!     let outcome = downloader
//!         .download(Source::YouTube, "VIDEO_URL", &HandlerOptions::default())
//!         .await?;
//!     println!("Downloaded {} files", outcome.files.len());
//!
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod core;
pub mod download;
pub mod error;
pub mod session;
pub mod tools;
pub mod ui;
pub mod utils;

// Re-export main types
pub use crate::core::{
    detect_handler, Credentials, Dispatch, DownloadOutcome, Downloader, DriveMethod,
    HandlerOptions, InstagramAuth, Progress, ProgressEvent, Source,
};
pub use batch::{execute_batch, load_manifest, BatchOptions, BatchReport, ManifestItem};
pub use config::AppConfig;
pub use error::MultidlError;
pub use session::SessionStore;

/// Result type alias for multidl operations
pub type Result<T> = std::result::Result<T, MultidlError>;
