use std::path::{Path, MAIN_SEPARATOR};

/// Format a byte count with 1024 steps and no decimals, e.g. `"12 KB"`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "K", "M", "G", "T", "P", "E", "Z"];
    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1024.0 {
            return format!("{num:.0} {unit}B");
        }
        num /= 1024.0;
    }
    format!("{num:.0} YB")
}

/// Extension including the leading dot, or `""` when there is none.
pub fn file_type_suffix(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

/// The parent directory with a trailing separator.
pub fn filter_path(path: &Path) -> String {
    match path.parent() {
        Some(parent) => {
            let mut s = parent.to_string_lossy().to_string();
            if !s.ends_with(MAIN_SEPARATOR) {
                s.push(MAIN_SEPARATOR);
            }
            s
        }
        None => String::new(),
    }
}

/// Reduce a client-supplied filename to a single safe path component.
///
/// Directory parts are dropped, as are leading dots and whitespace.
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// MIME type for a download, chosen from the file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        other => image_mime(other).unwrap_or("application/octet-stream"),
    }
}

/// MIME type for an image preview, falling back to JPEG.
pub fn image_mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    image_mime(&ext).unwrap_or("image/jpeg")
}

fn image_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "ico" => Some("image/x-icon"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}
