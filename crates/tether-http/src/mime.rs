//! Content types by file extension

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;

/// Fallback for unknown extensions
pub const OCTET_STREAM: &str = "application/octet-stream";

static MIME_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("html", "text/html"),
        ("htm", "text/html"),
        ("css", "text/css"),
        ("js", "text/javascript"),
        ("mjs", "text/javascript"),
        ("txt", "text/plain"),
        ("csv", "text/csv"),
        ("xml", "text/xml"),
        ("md", "text/markdown"),
        ("json", "application/json"),
        ("map", "application/json"),
        ("wasm", "application/wasm"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("svg", "image/svg+xml"),
        ("ico", "image/x-icon"),
        ("webp", "image/webp"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("ttf", "font/ttf"),
        ("otf", "font/otf"),
        ("mp3", "audio/mpeg"),
        ("wav", "audio/wav"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
    ])
});

/// `Content-Type` value for `path`.
///
/// Text types are served as UTF-8.
pub fn content_type(path: &Path) -> String {
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|ext| MIME_TYPES.get(ext.as_str()).copied())
        .unwrap_or(OCTET_STREAM);

    if mime.starts_with("text/") {
        format!("{}; charset=utf-8", mime)
    } else {
        mime.to_string()
    }
}
