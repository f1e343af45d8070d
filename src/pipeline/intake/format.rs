use std::path::Path;

use serde::{Deserialize, Serialize};

/// Media types accepted at intake, in whitelist order.
pub const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/csv",
    "image/png",
    "image/jpeg",
    "image/webp",
];

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Pdf,
    Xls,
    Xlsx,
    Csv,
    Png,
    Jpeg,
    Webp,
}

impl MediaType {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Xls => "application/vnd.ms-excel",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Csv => "text/csv",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    /// Exact match against the whitelist. Parameters such as
    /// `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.ms-excel" => Some(Self::Xls),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(Self::Xlsx)
            }
            "text/csv" => Some(Self::Csv),
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Webp)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}

/// Detect a media type from magic bytes. Extensions can lie; headers don't.
///
/// CSV has no signature and OLE2 containers are shared by several Office
/// formats, so both return `None` and are left to the extension.
pub fn sniff_media_type(bytes: &[u8]) -> Option<MediaType> {
    match bytes {
        // %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(MediaType::Pdf),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(MediaType::Png),
        [0xFF, 0xD8, 0xFF, ..] => Some(MediaType::Jpeg),
        // RIFF....WEBP
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(MediaType::Webp),
        // ZIP local file header; XLSX keeps its parts under xl/
        [0x50, 0x4B, 0x03, 0x04, ..] if contains(bytes, b"xl/") => Some(MediaType::Xlsx),
        _ => None,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    let window = &haystack[..haystack.len().min(64 * 1024)];
    window.windows(needle.len()).any(|w| w == needle)
}

/// Best-effort MIME type for a file read from disk: magic bytes first, then
/// the extension. Unknown content maps to `application/octet-stream`, which
/// the validator rejects.
pub fn infer_media_type(name: &str, bytes: &[u8]) -> String {
    if let Some(sniffed) = sniff_media_type(bytes) {
        return sniffed.mime().to_string();
    }
    mime_guess::from_path(name)
        .iter()
        .map(|m| m.essence_str().to_string())
        .find(|m| MediaType::from_mime(m).is_some())
        .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string())
}

/// Sanitize a filename: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0') && !c.is_control())
        .take(255)
        .collect();

    if clean.is_empty() || clean == "." || clean == ".." {
        "document".to_string()
    } else {
        clean
    }
}
