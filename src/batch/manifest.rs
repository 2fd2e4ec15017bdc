//! Manifest loading for JSON and CSV scraper outputs

use crate::error::MultidlError;
use crate::utils::{normalize_url, split_url_list};
use crate::Result;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const SOURCE_COLUMNS: [&str; 2] = ["source", "Source"];
const ITEM_COLUMNS: [&str; 2] = ["items_comma_separated", "items"];

/// One URL from a manifest with the source label it was filed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub source_hint: String,
    pub url: String,
}

impl ManifestItem {
    pub fn new(source_hint: impl Into<String>, url: &str) -> Self {
        Self {
            source_hint: source_hint.into(),
            url: normalize_url(url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Csv,
}

impl ManifestFormat {
    /// Explicit override if given, else the file extension
    pub fn resolve(path: &Path, format: Option<&str>) -> Result<Self> {
        let name = match format {
            Some(format) => format.to_string(),
            None => path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        name.parse()
    }
}

impl FromStr for ManifestFormat {
    type Err = MultidlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "json" => Ok(ManifestFormat::Json),
            "csv" => Ok(ManifestFormat::Csv),
            other => Err(MultidlError::UnsupportedManifest(other.to_string())),
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestFormat::Json => f.write_str("json"),
            ManifestFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Read every item from a manifest file
pub fn load_manifest(path: &Path, format: Option<&str>) -> Result<Vec<ManifestItem>> {
    let format = ManifestFormat::resolve(path, format)?;
    let items = match format {
        ManifestFormat::Json => {
            let content = std::fs::read_to_string(path)?;
            parse_json_manifest(&content)?
        }
        ManifestFormat::Csv => parse_csv_manifest(csv_reader(std::fs::File::open(path)?))?,
    };
    debug!("Loaded {} items from {} manifest {}", items.len(), format, path.display());
    Ok(items)
}

/// Text of a manifest value; null, empty and `false` entries are dropped
fn url_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) => s.clone(),
        Value::Array(a) if a.is_empty() => return None,
        Value::Object(o) if o.is_empty() => return None,
        other => other.to_string(),
    };
    let text = normalize_url(&text);
    (!text.is_empty()).then_some(text)
}

pub fn parse_json_manifest(content: &str) -> Result<Vec<ManifestItem>> {
    let data: Value = serde_json::from_str(content)?;
    let mut items = Vec::new();

    match data {
        Value::Object(groups) => {
            for (source, urls) in groups {
                let urls = match urls {
                    Value::Object(mut group) => group.remove("items").unwrap_or(Value::Null),
                    other => other,
                };
                let Value::Array(urls) = urls else {
                    continue;
                };
                items.extend(
                    urls.iter()
                        .filter_map(url_text)
                        .map(|url| ManifestItem::new(source.clone(), &url)),
                );
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                let Value::Object(entry) = entry else {
                    continue;
                };
                let Some(url) = entry.get("url").and_then(url_text) else {
                    continue;
                };
                let source = entry.get("source").and_then(url_text).unwrap_or_default();
                items.push(ManifestItem::new(source, &url));
            }
        }
        _ => {
            return Err(MultidlError::Manifest(
                "JSON manifest must be an object or array".to_string(),
            ))
        }
    }

    Ok(items)
}

/// Scraper exports may end a row early; short rows read as missing columns
pub fn csv_reader<R: std::io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new().flexible(true).from_reader(input)
}

pub fn parse_csv_manifest<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<ManifestItem>> {
    let headers = reader.headers()?.clone();
    let column = |names: &[&str], record: &csv::StringRecord| -> String {
        names
            .iter()
            .filter_map(|name| headers.iter().position(|h| h == *name))
            .filter_map(|index| record.get(index))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
            .to_string()
    };

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record?;
        let source = column(&SOURCE_COLUMNS, &record);
        let field = column(&ITEM_COLUMNS, &record);
        if field.is_empty() {
            continue;
        }
        items.extend(
            split_url_list(&field)
                .into_iter()
                .map(|url| ManifestItem::new(source.clone(), &url)),
        );
    }
    Ok(items)
}
