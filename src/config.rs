//! Persistent settings for multidl
//!
//! Loaded from `<config dir>/multidl/config.json`; a missing file means
//! defaults. Environment variables override the file, CLI flags override both.

use crate::error::MultidlError;
use crate::tools::ToolPaths;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const APP_DIR: &str = "multidl";
const CONFIG_FILE: &str = "config.json";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where downloads land when no directory is given
    pub output_dir: PathBuf,
    /// Root of the session store
    pub session_dir: PathBuf,
    /// Per-tool-invocation timeout in seconds
    pub timeout_secs: u64,
    /// Extra attempts for transient tool failures
    pub max_retries: u32,
    pub tools: ToolPaths,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            session_dir: default_session_dir(),
            timeout_secs: 30 * 60,
            max_retries: 1,
            tools: ToolPaths::default(),
        }
    }
}

fn default_session_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR).join("sessions"))
        .unwrap_or_else(|| PathBuf::from(".sessions"))
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path` (or the default path) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) => Self::load_or_create(&path)?,
            None => {
                debug!("No config directory, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read `path`, writing the defaults there first when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::from_file(path);
        }

        let config = Self::default();
        if let Err(e) = config.save(path) {
            warn!("Could not create {}: {}", path.display(), e);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| MultidlError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply `MULTIDL_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = non_empty("MULTIDL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("MULTIDL_SESSION_DIR") {
            self.session_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty("MULTIDL_YTDLP") {
            self.tools.yt_dlp = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty("MULTIDL_GDOWN") {
            self.tools.gdown = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty("MULTIDL_INSTALOADER") {
            self.tools.instaloader = Some(PathBuf::from(path));
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
