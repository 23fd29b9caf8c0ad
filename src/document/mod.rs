pub mod inline;
pub mod placement;

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentFormat {
    Html,
    Markdown,
    Docx,
    Pdf,
    Text,
    Image,
    Unknown,
}

pub fn detect_format(path: &Path) -> DocumentFormat {
    match extension_of(path).as_deref() {
        Some("html" | "htm") => DocumentFormat::Html,
        Some("md" | "markdown") => DocumentFormat::Markdown,
        Some("docx") => DocumentFormat::Docx,
        Some("pdf") => DocumentFormat::Pdf,
        Some("txt") => DocumentFormat::Text,
        Some(ext) if mime_for_image_extension(ext).is_some() => DocumentFormat::Image,
        _ => DocumentFormat::Unknown,
    }
}

/// Content type for a document served as raw bytes.
pub fn content_type_for(path: &Path) -> &'static str {
    match detect_format(path) {
        DocumentFormat::Html => "text/html",
        DocumentFormat::Pdf => "application/pdf",
        DocumentFormat::Docx => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        DocumentFormat::Image => extension_of(path)
            .as_deref()
            .and_then(mime_for_image_extension)
            .unwrap_or("application/octet-stream"),
        DocumentFormat::Markdown | DocumentFormat::Text | DocumentFormat::Unknown => {
            "application/octet-stream"
        }
    }
}

pub fn mime_for_image_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "bmp" => Some("image/bmp"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "tif" | "tiff" => Some("image/tiff"),
        "svg" => Some("image/svg+xml"),
        "ico" => Some("image/x-icon"),
        _ => None,
    }
}

/// Reads a document from disk, inlining local images for HTML.
pub fn load_for_editor(path: &Path) -> std::io::Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    Ok(prepare_for_editor(path, bytes))
}

/// HTML is rewritten so the editor never needs filesystem access for images.
pub fn prepare_for_editor(path: &Path, bytes: Vec<u8>) -> Vec<u8> {
    if detect_format(path) != DocumentFormat::Html {
        return bytes;
    }
    match String::from_utf8(bytes) {
        Ok(html) => inline::inline_local_images(&html, path).into_bytes(),
        Err(err) => err.into_bytes(),
    }
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
