//! Supported sources and host/alias detection

use crate::error::MultidlError;
use crate::utils::host_of;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A media source handled by one of the downloader tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    GoogleDrive,
    Instagram,
    TikTok,
    Threads,
    Twitter,
    Reddit,
    Facebook,
    YouTube,
}

/// Ordered alias table, first substring match wins
pub const ALIAS_MAP: &[(&str, Source)] = &[
    ("drive.google.com", Source::GoogleDrive),
    ("docs.google.com", Source::GoogleDrive),
    ("googledrive", Source::GoogleDrive),
    ("googleusercontent", Source::GoogleDrive),
    ("instagram", Source::Instagram),
    ("instagr", Source::Instagram),
    ("ddinstagram", Source::Instagram),
    ("threads", Source::Threads),
    ("tiktok", Source::TikTok),
    ("douyin", Source::TikTok),
    ("twitter", Source::Twitter),
    ("x.com", Source::Twitter),
    ("fxtwitter", Source::Twitter),
    ("vxtwitter", Source::Twitter),
    ("reddit", Source::Reddit),
    ("redd.it", Source::Reddit),
    ("facebook", Source::Facebook),
    ("fb.watch", Source::Facebook),
    ("fbcdn", Source::Facebook),
    ("youtube", Source::YouTube),
    ("youtu.be", Source::YouTube),
    ("youtubekids", Source::YouTube),
];

impl Source {
    /// All sources in menu order
    pub const ALL: [Source; 8] = [
        Source::GoogleDrive,
        Source::Instagram,
        Source::TikTok,
        Source::Threads,
        Source::Twitter,
        Source::Reddit,
        Source::Facebook,
        Source::YouTube,
    ];

    /// Human readable name, also used as the dispatch key
    pub fn display_name(&self) -> &'static str {
        match self {
            Source::GoogleDrive => "Google Drive",
            Source::Instagram => "Instagram",
            Source::TikTok => "TikTok",
            Source::Threads => "Threads",
            Source::Twitter => "Twitter",
            Source::Reddit => "Reddit",
            Source::Facebook => "Facebook",
            Source::YouTube => "YouTube",
        }
    }

    /// Whether the source is served by yt-dlp
    pub fn uses_ytdlp(&self) -> bool {
        !matches!(self, Source::GoogleDrive | Source::Instagram)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Source {
    type Err = MultidlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "googledrive" | "gdrive" | "drive" => Ok(Source::GoogleDrive),
            "instagram" | "ig" => Ok(Source::Instagram),
            "tiktok" => Ok(Source::TikTok),
            "threads" => Ok(Source::Threads),
            "twitter" | "x" => Ok(Source::Twitter),
            "reddit" => Ok(Source::Reddit),
            "facebook" | "fb" => Ok(Source::Facebook),
            "youtube" | "yt" => Ok(Source::YouTube),
            _ => Err(MultidlError::UnknownSource(s.to_string())),
        }
    }
}

/// Match a free-form value (source hint or host) against the alias table
pub fn match_alias(value: &str) -> Option<Source> {
    let value = value.to_lowercase();
    ALIAS_MAP
        .iter()
        .find(|(alias, _)| value.contains(alias))
        .map(|(_, source)| *source)
}

/// Return the handler for an item, trying the source hint before the URL host
pub fn detect_handler(source_hint: &str, url: &str) -> Option<Source> {
    let host = host_of(url).unwrap_or_default();

    let found = [source_hint, host.as_str()]
        .into_iter()
        .find_map(match_alias);
    found
}
