//! Safe filename generation utilities

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const MAX_STEM_BYTES: usize = 200;

fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap())
}

/// Convert a title to a safe filename by removing/replacing invalid characters
pub fn to_safe_filename(title: &str, extension: &str) -> String {
    let replaced = invalid_chars().replace_all(title, "_");
    let mut safe_title = replaced
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_string();

    // Windows has a 255 char limit; cut on a char boundary
    if safe_title.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES;
        while !safe_title.is_char_boundary(cut) {
            cut -= 1;
        }
        safe_title.truncate(cut);
        safe_title = safe_title.trim_end().to_string();
    }

    if safe_title.is_empty() {
        safe_title = "download".to_string();
    }

    if extension.is_empty() {
        safe_title
    } else if extension.starts_with('.') {
        format!("{}{}", safe_title, extension)
    } else {
        format!("{}.{}", safe_title, extension)
    }
}

/// Check if a filename is safe for the current filesystem
pub fn is_safe_filename(filename: &str) -> bool {
    if filename.is_empty() || filename.len() > 255 {
        return false;
    }

    if invalid_chars().is_match(filename) {
        return false;
    }

    let reserved_names = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    if let Some(stem) = Path::new(filename).file_stem().and_then(|s| s.to_str()) {
        if reserved_names.contains(&stem.to_uppercase().as_str()) {
            return false;
        }
    }

    !(filename.starts_with('.')
        || filename.ends_with('.')
        || filename.starts_with(' ')
        || filename.ends_with(' '))
}

/// Generate a unique filename by appending a number if the file already exists
pub fn generate_unique_filename(base_path: &Path, filename: &str) -> std::io::Result<String> {
    let mut counter = 1;
    let mut final_filename = filename.to_string();

    while base_path.join(&final_filename).exists() {
        let path = Path::new(filename);
        let stem = path.file_stem().unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        final_filename = format!("{} ({}){}", stem.to_string_lossy(), counter, extension);
        counter += 1;

        if counter > 10000 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "Too many files with similar names",
            ));
        }
    }

    Ok(final_filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_safe_filename() {
        assert_eq!(to_safe_filename("report: final.pdf", ""), "report_ final.pdf");
        assert_eq!(
            to_safe_filename("Clip with <invalid> chars", "mp4"),
            "Clip with _invalid_ chars.mp4"
        );
        assert_eq!(to_safe_filename("", ".bin"), "download.bin");
        assert_eq!(to_safe_filename(" ..hidden.. ", ""), "hidden");
    }

    #[test]
    fn test_to_safe_filename_truncates_on_char_boundary() {
        let long = "é".repeat(150); // 300 bytes
        let safe = to_safe_filename(&long, "");
        assert!(safe.len() <= MAX_STEM_BYTES);
        assert!(safe.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_is_safe_filename() {
        assert!(is_safe_filename("alice.session"));
        assert!(is_safe_filename("clip with spaces.mp4"));
        assert!(!is_safe_filename("file<with>invalid:chars.mp4"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename(".hidden"));
        assert!(!is_safe_filename("CON.txt"));
        assert!(!is_safe_filename("../escape"));
    }

    #[test]
    fn test_generate_unique_filename() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            generate_unique_filename(dir.path(), "a.pdf").unwrap(),
            "a.pdf"
        );

        std::fs::write(dir.path().join("a.pdf"), b"1").unwrap();
        std::fs::write(dir.path().join("a (1).pdf"), b"2").unwrap();
        assert_eq!(
            generate_unique_filename(dir.path(), "a.pdf").unwrap(),
            "a (2).pdf"
        );
    }
}
