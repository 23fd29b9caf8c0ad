//! Rewrites local `<img src>` references into `data:` URIs.
//!
//! This is a tolerant, tag-at-a-time pass over untrusted HTML. Whenever a tag
//! cannot be handled (no `src`, a remote or already-inlined source, a file that
//! cannot be read) the tag is left exactly as it was.

use std::{
    fs,
    path::{MAIN_SEPARATOR_STR, Path, PathBuf},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::{Captures, Regex};

use super::{extension_of, mime_for_image_extension};

const REMOTE_PREFIXES: &[&str] = &["data:", "http:", "https:", "//", "blob:"];

struct ImagePatterns {
    img_tag: Regex,
    src_attr: Regex,
}

impl ImagePatterns {
    fn new() -> Option<Self> {
        Some(Self {
            img_tag: Regex::new(r"(?i)<img\s+[^>]*>").ok()?,
            src_attr: Regex::new(r#"(?i)(\s|^)src\s*=\s*("([^"]*)"|'([^']*)')"#).ok()?,
        })
    }
}

pub fn inline_local_images(html: &str, html_path: &Path) -> String {
    let Some(patterns) = ImagePatterns::new() else {
        return html.to_string();
    };
    let base_dir = html_path.parent().unwrap_or_else(|| Path::new(""));

    patterns
        .img_tag
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            inline_tag(tag, &patterns.src_attr, base_dir).unwrap_or_else(|| tag.to_string())
        })
        .into_owned()
}

fn inline_tag(tag: &str, src_attr: &Regex, base_dir: &Path) -> Option<String> {
    let caps = src_attr.captures(tag)?;
    let attr = caps.get(0)?;
    let lead = caps.get(1).map_or("", |m| m.as_str());
    let (src, quote) = match (caps.get(3), caps.get(4)) {
        (Some(m), _) => (m.as_str(), '"'),
        (None, Some(m)) => (m.as_str(), '\''),
        (None, None) => return None,
    };

    let path = resolve_local_source(src, base_dir)?;
    let data = fs::read(&path).ok()?;
    let uri = format!("data:{};base64,{}", sniff_mime(&data, &path), STANDARD.encode(&data));

    let mut out = String::with_capacity(tag.len() + uri.len());
    out.push_str(tag.get(..attr.start())?);
    out.push_str(lead);
    out.push_str("src=");
    out.push(quote);
    out.push_str(&uri);
    out.push(quote);
    out.push_str(tag.get(attr.end()..)?);
    Some(out)
}

/// Page-relative sources resolve under `base_dir`, including root-relative ones
/// (`/img/a.png`). Only `file://` URLs may name a path outside it.
fn resolve_local_source(src: &str, base_dir: &Path) -> Option<PathBuf> {
    let src = src.trim();
    let lower = src.to_ascii_lowercase();
    if src.is_empty() || REMOTE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return None;
    }

    let clean = src.split(['?', '#']).next().unwrap_or_default();
    let (clean, file_url) = match strip_file_scheme(clean) {
        Some(rest) => (rest, true),
        None => (clean, false),
    };
    if clean.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(clean)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| clean.to_string());

    if file_url {
        return Some(PathBuf::from(decoded.replace('/', MAIN_SEPARATOR_STR)));
    }
    let relative = decoded.trim_start_matches(['/', '\\']);
    if relative.is_empty() || has_drive_prefix(relative) {
        return None;
    }
    Some(base_dir.join(relative.replace('/', MAIN_SEPARATOR_STR)))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// The path part of a `file://` URL, or `None` for any other source.
fn strip_file_scheme(src: &str) -> Option<&str> {
    let rest = src
        .strip_prefix("file://")
        .or_else(|| src.strip_prefix("FILE://"))?;
    // file:///C:/dir/img.png carries a leading slash before the drive letter.
    match rest.strip_prefix('/') {
        Some(drive) if has_drive_prefix(drive) => Some(drive),
        _ => Some(rest),
    }
}

fn sniff_mime(data: &[u8], path: &Path) -> &'static str {
    image::guess_format(data)
        .ok()
        .map(|format| format.to_mime_type())
        .or_else(|| extension_of(path).as_deref().and_then(mime_for_image_extension))
        .unwrap_or("application/octet-stream")
}
