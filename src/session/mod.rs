//! Local session storage for handler auth artifacts
//!
//! Cookies, instaloader sessions and OAuth tokens are kept under one
//! directory per source inside the store root, e.g.
//!
//! ```text
//! <root>/
//!   google_drive/credentials.json
//!   instagram/alice.session
//!   instagram/meta.json
//!   tiktok/cookies.txt
//! ```
//!
//! The files are produced and consumed by the wrapped tools; the store only
//! owns the layout.

use crate::error::MultidlError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const COOKIE_FILE: &str = "cookies.txt";
pub const METADATA_FILE: &str = "meta.json";
pub const DEFAULT_SESSION_FILE: &str = "session.bin";

/// Turn a source name into a directory name
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Check that `content` looks like a Netscape cookies.txt export
pub fn is_netscape_cookie_file(content: &str) -> bool {
    let first = content.lines().next().unwrap_or("").trim();
    if first.starts_with("# Netscape HTTP Cookie File") || first.starts_with("# HTTP Cookie File") {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && (!line.starts_with('#') || line.starts_with("#HttpOnly_")))
        .any(|line| line.split('\t').count() == 7)
}

/// Fixed directory layout for cookies and cached sessions
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `source`, created on demand
    pub fn ensure_dir(&self, source: &str) -> Result<PathBuf> {
        let directory = self.root.join(sanitize(source));
        fs::create_dir_all(&directory)?;
        Ok(directory)
    }

    pub fn path_for(&self, source: &str, filename: &str) -> Result<PathBuf> {
        Ok(self.ensure_dir(source)?.join(filename))
    }

    /// Read a JSON artifact; missing or malformed files read as `None`
    pub fn read_json<T: DeserializeOwned>(&self, source: &str, filename: &str) -> Option<T> {
        let path = self.path_for(source, filename).ok()?;
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn write_json<T: Serialize>(&self, source: &str, filename: &str, data: &T) -> Result<PathBuf> {
        let body = serde_json::to_vec_pretty(data)?;
        self.write_binary(source, filename, &body)
    }

    pub fn read_text(&self, source: &str, filename: &str) -> Option<String> {
        let path = self.path_for(source, filename).ok()?;
        fs::read_to_string(path).ok()
    }

    pub fn write_text(&self, source: &str, filename: &str, text: &str) -> Result<PathBuf> {
        self.write_binary(source, filename, text.as_bytes())
    }

    /// Write through a temp file in the same directory, then rename
    pub fn write_binary(&self, source: &str, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let directory = self.ensure_dir(source)?;
        let path = directory.join(filename);

        let mut tmp = tempfile::NamedTempFile::new_in(&directory)?;
        tmp.write_all(data)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| MultidlError::Io(e.error))?;

        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(path)
    }

    /// Files in the source directory, optionally filtered by suffix
    pub fn list_files(&self, source: &str, suffix: Option<&str>) -> Result<BTreeMap<String, PathBuf>> {
        let directory = self.ensure_dir(source)?;
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(&directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if suffix.is_some_and(|s| !name.ends_with(s)) {
                continue;
            }
            files.insert(name, entry.path());
        }
        Ok(files)
    }

    pub fn default_cookie_path(&self, source: &str) -> Result<PathBuf> {
        self.path_for(source, COOKIE_FILE)
    }

    pub fn default_metadata_path(&self, source: &str) -> Result<PathBuf> {
        self.path_for(source, METADATA_FILE)
    }

    pub fn load_default_session(&self, source: &str) -> Option<Vec<u8>> {
        let path = self.path_for(source, DEFAULT_SESSION_FILE).ok()?;
        fs::read(path).ok()
    }

    pub fn write_default_session(&self, source: &str, data: &[u8]) -> Result<PathBuf> {
        self.write_binary(source, DEFAULT_SESSION_FILE, data)
    }

    /// Validate a browser cookie export and install it as the source's cookies.txt
    pub fn import_cookie_file(&self, source: &str, path: &Path) -> Result<PathBuf> {
        let content = fs::read_to_string(path).map_err(|e| {
            MultidlError::InvalidCookieFile(format!("{}: {}", path.display(), e))
        })?;

        if !is_netscape_cookie_file(&content) {
            return Err(MultidlError::InvalidCookieFile(format!(
                "{} is not in Netscape cookies.txt format",
                path.display()
            )));
        }

        let target = self.write_text(source, COOKIE_FILE, &content)?;
        info!("Imported cookies for {} into {}", source, target.display());
        Ok(target)
    }
}
