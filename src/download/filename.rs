//! Filename derivation, sanitization, and path resolution for downloads.
//!
//! Names come from the resolved URL's last path segment first, then the
//! `Content-Disposition` header, then the item id.

use std::path::{Component, Path, PathBuf};

use tracing::debug;
use url::Url;

/// Maximum filename length in UTF-8 bytes, extension included.
///
/// Filesystems cap names at 255 bytes; the rest is left for the `.part`
/// suffix and a ` (n)` collision marker.
pub const MAX_FILENAME_BYTES: usize = 240;

/// Extension used when nothing better is known.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Derives the on-disk filename for a resolved download.
#[must_use]
pub fn derive_filename(url: &Url, content_disposition: Option<&str>, id: &str) -> String {
    if let Some(name) = filename_from_url(url) {
        return finish(&name);
    }

    if let Some(name) = content_disposition.and_then(parse_content_disposition) {
        let name = name.trim();
        if !name.is_empty() {
            return finish(name);
        }
    }

    let id = sanitize_filename(id.trim());
    finish(&format!("{id}{FALLBACK_EXTENSION}"))
}

/// Percent-decoded last path segment, only when it looks like a file.
fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(
        |e| {
            debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
            last.to_string()
        },
        std::borrow::Cow::into_owned,
    );
    split_extension(&decoded).1.map(|_| decoded.clone())
}

fn finish(name: &str) -> String {
    cap_length(&sanitize_filename(&normalize_delimited_name(name)))
}

/// Rewrites the `Title -- Author -- Publisher -- ...` convention to `Title - Author`.
#[must_use]
pub fn normalize_delimited_name(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    let parts: Vec<&str> = stem
        .split("--")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let stem = match parts.as_slice() {
        [title, author, ..] => format!("{title} - {author}"),
        [only] => (*only).to_string(),
        [] => stem.trim().to_string(),
    };
    format!("{stem}{}", ext.unwrap_or(""))
}

/// Splits `name` into stem and a plausible extension (`.epub`, `.pdf`, ...).
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => {
            let ext = &name[pos..];
            let plausible = (2..=10).contains(&ext.len())
                && ext[1..].chars().all(|c| c.is_ascii_alphanumeric());
            if plausible {
                (&name[..pos], Some(ext))
            } else {
                (name, None)
            }
        }
        _ => (name, None),
    }
}

/// Truncates the stem so the whole name fits in [`MAX_FILENAME_BYTES`].
fn cap_length(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let ext = ext.unwrap_or("");
    let stem = truncate_at_char_boundary(stem, MAX_FILENAME_BYTES.saturating_sub(ext.len()));
    format!("{}{ext}", stem.trim_end())
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Resolves a unique file path, adding a numeric suffix if the file exists.
///
/// `file.epub`, then `file_1.epub`, `file_2.epub`, ...
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.contains('/')
            || sanitized.contains('\\')
            || sanitized.trim_matches('_').is_empty()
        {
            format!("download{FALLBACK_EXTENSION}")
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);

    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos..]),
        None => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let new_path = dir.join(format!("{stem}_{i}{ext}"));
        if !new_path.exists() {
            return new_path;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_derive_filename_from_url_normalizes_delimiters() {
        let u = url(
            "https://b4mcx2ml.net/d3/y/1700/Dune%20--%20Frank%20Herbert%20--%20Ace%20--%20d6e1%20--%20Anna%E2%80%99s%20Archive.epub",
        );
        assert_eq!(derive_filename(&u, None, "d6e1"), "Dune - Frank Herbert.epub");
    }

    #[test]
    fn test_derive_filename_skips_extensionless_segment() {
        let u = url("https://files.example.com/get/abc123");
        let name = derive_filename(&u, Some(r#"attachment; filename="Emma.pdf""#), "abc123");
        assert_eq!(name, "Emma.pdf");
    }

    #[test]
    fn test_derive_filename_falls_back_to_id() {
        let u = url("https://files.example.com/");
        assert_eq!(derive_filename(&u, None, "d6e1f0"), "d6e1f0.bin");
    }

    #[test]
    fn test_derive_filename_strips_invalid_chars() {
        let u = url("https://x.example/What%3F%20Why%3A%20How.epub");
        assert_eq!(derive_filename(&u, None, "id"), "What_ Why_ How.epub");
    }

    #[test]
    fn test_derive_filename_caps_length_and_keeps_extension() {
        let long = "a".repeat(400);
        let u = url(&format!("https://x.example/{long}.epub"));
        let name = derive_filename(&u, None, "id");
        assert_eq!(name.len(), MAX_FILENAME_BYTES);
        assert!(name.ends_with(".epub"));
    }

    #[test]
    fn test_derive_filename_caps_multibyte_titles_by_bytes() {
        let title = "Война и мир ".repeat(30);
        let u = url(&format!(
            "https://x.example/{}.epub",
            urlencoding::encode(&title)
        ));
        let name = derive_filename(&u, None, "id");

        assert!(name.len() <= MAX_FILENAME_BYTES, "{} bytes", name.len());
        assert!(name.starts_with("Война и мир"));
        assert!(name.ends_with(".epub"));

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{name}.part")), b"x").unwrap();
    }

    #[test]
    fn test_truncate_never_splits_a_character() {
        assert_eq!(truncate_at_char_boundary("日本語", 4), "日");
        assert_eq!(truncate_at_char_boundary("abc", 10), "abc");
    }

    #[test]
    fn test_normalize_delimited_name_variants() {
        assert_eq!(normalize_delimited_name("Title -- Author.epub"), "Title - Author.epub");
        assert_eq!(normalize_delimited_name("Plain Title.pdf"), "Plain Title.pdf");
        assert_eq!(normalize_delimited_name("A -- B -- C -- D"), "A - B");
        assert_eq!(normalize_delimited_name(" -- Solo -- .mobi"), "Solo.mobi");
    }

    #[test]
    fn test_parse_content_disposition_quoted() {
        let header = r#"attachment; filename="example.pdf""#;
        assert_eq!(parse_content_disposition(header), Some("example.pdf".to_string()));
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        let header = "attachment; filename=example.pdf; size=10";
        assert_eq!(parse_content_disposition(header), Some("example.pdf".to_string()));
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        let header = "attachment; filename*=UTF-8''Les%20Mis%C3%A9rables.epub";
        assert_eq!(
            parse_content_disposition(header),
            Some("Les Misérables.epub".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert_eq!(parse_content_disposition("attachment"), None);
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("a/b"), "a_b");
    }

    #[test]
    fn test_resolve_unique_path_with_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("book.epub"), b"1").unwrap();
        std::fs::write(temp_dir.path().join("book_1.epub"), b"2").unwrap();

        let path = resolve_unique_path(temp_dir.path(), "book.epub");
        assert_eq!(path, temp_dir.path().join("book_2.epub"));
    }

    #[test]
    fn test_resolve_unique_path_stays_under_dir() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        for malicious in ["../../etc/passwd", ".."] {
            let path = resolve_unique_path(base, malicious);
            assert!(path.starts_with(base));
            assert!(!path.components().any(|c| c == Component::ParentDir));
        }
    }
}
