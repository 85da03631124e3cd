//! Helpers shared by the reader and writer: media types, archive paths, text decoding.

use std::borrow::Cow;
use std::path::Path;

/// Current UTC time as used by `dcterms:modified`.
pub fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Random (version 4) UUID string, without the `urn:uuid:` prefix.
pub fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Look up the media type for a file name by its extension.
pub fn guess_media_type(path: &str) -> Option<&'static str> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();

    let media_type = match ext.as_str() {
        "xhtml" | "html" | "htm" => "application/xhtml+xml",
        "css" => "text/css",
        "js" => "application/javascript",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ncx" => "application/x-dtbncx+xml",
        "opf" => "application/oebps-package+xml",
        "smil" => "application/smil+xml",
        "mp3" => "audio/mpeg",
        "m4a" | "mp4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "pls" => "application/pls+xml",
        _ => return None,
    };
    Some(media_type)
}

/// Map non-standard media type labels to their registered form.
pub fn normalize_media_type(media_type: &str) -> String {
    match media_type.trim().to_ascii_lowercase().as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "text/xhtml" | "application/xhtml" => "application/xhtml+xml".to_string(),
        _ => media_type.trim().to_string(),
    }
}

/// Decode bytes to a string, handling various encodings.
///
/// Tries UTF-8 first, then the hint encoding (from `<?xml encoding="..."?>`),
/// and finally falls back to Windows-1252.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Strip UTF-8 BOM (byte order mark) if present
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Percent-decode an href, keeping the raw text when it is not valid UTF-8.
pub fn unquote(href: &str) -> String {
    percent_encoding::percent_decode_str(href)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string())
}

/// Directory part of an archive path ("" for top-level files).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// Join an href onto a base directory and collapse `.` / `..` segments.
pub fn join_path(base: &str, href: &str) -> String {
    if base.is_empty() {
        normalize_path(href)
    } else {
        normalize_path(&format!("{}/{}", base, href))
    }
}

/// Collapse `.` and `..` segments of a `/`-separated path.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Whether an href points outside the package (`https://…`, `mailto:…`).
pub fn is_external(href: &str) -> bool {
    href.contains("://") || href.starts_with("mailto:")
}

/// Resolve an href read from a navigation document against its directory.
/// External URLs pass through untouched.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    if is_external(href) {
        href.to_string()
    } else {
        join_path(base_dir, &unquote(href))
    }
}

/// Express `target` relative to the directory `base_dir`.
///
/// External URLs and empty targets are returned unchanged.
pub fn relative_path(target: &str, base_dir: &str) -> String {
    if target.is_empty() || is_external(target) {
        return target.to_string();
    }
    let target = normalize_path(target);
    let base = normalize_path(base_dir);
    if base.is_empty() {
        return target;
    }

    let target_parts: Vec<&str> = target.split('/').collect();
    let base_parts: Vec<&str> = base.split('/').collect();
    let common = target_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; base_parts.len() - common];
    parts.extend_from_slice(&target_parts[common..]);
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}
