//! External downloader tools and how to run them

pub mod runner;

pub use runner::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The third-party programs multidl drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    YtDlp,
    Gdown,
    Instaloader,
}

impl Tool {
    /// Executable name looked up on PATH
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Gdown => "gdown",
            Tool::Instaloader => "instaloader",
        }
    }

    /// Environment variable overriding the executable path
    pub fn env_var(&self) -> &'static str {
        match self {
            Tool::YtDlp => "MULTIDL_YTDLP",
            Tool::Gdown => "MULTIDL_GDOWN",
            Tool::Instaloader => "MULTIDL_INSTALOADER",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Configured executable paths; `None` means auto-detect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yt_dlp: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdown: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instaloader: Option<PathBuf>,
}

impl ToolPaths {
    fn configured(&self, tool: Tool) -> Option<&PathBuf> {
        match tool {
            Tool::YtDlp => self.yt_dlp.as_ref(),
            Tool::Gdown => self.gdown.as_ref(),
            Tool::Instaloader => self.instaloader.as_ref(),
        }
    }

    /// Resolve the program to execute for `tool`
    ///
    /// Order: configured path, environment override, common install
    /// locations, then the bare name for PATH lookup.
    pub fn resolve(&self, tool: Tool) -> PathBuf {
        if let Some(path) = self.configured(tool) {
            return path.clone();
        }

        if let Ok(path) = std::env::var(tool.env_var()) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        let name = tool.binary_name();
        let mut candidates = vec![
            PathBuf::from("/opt/homebrew/bin").join(name),
            PathBuf::from("/usr/local/bin").join(name),
            PathBuf::from("/usr/bin").join(name),
        ];
        if let Some(home) = dirs::home_dir() {
            candidates.insert(0, home.join(".local/bin").join(name));
        }

        if let Some(found) = candidates.into_iter().find(|p| is_file(p)) {
            debug!("Found {} at {}", name, found.display());
            return found;
        }

        PathBuf::from(name)
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
