//! Static editor UI served for every GET that is not an API route.

use std::{
    fs,
    path::{Path, PathBuf},
};

use super::reply::Reply;
use crate::document::{self, extension_of};

pub fn serve(root: &Path, url_path: &str) -> Reply {
    let Some(path) = resolve(root, url_path) else {
        return Reply::text(404, "Not found");
    };
    match fs::read(&path) {
        Ok(data) => Reply::bytes(data, content_type(&path)),
        Err(error) => {
            tracing::debug!(path = %path.display(), %error, "static file not served");
            Reply::text(404, "Not found")
        }
    }
}

/// Maps a request path under `root`, refusing anything that would escape it.
fn resolve(root: &Path, url_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(url_path).ok()?;
    let mut path = root.to_path_buf();
    for segment in decoded.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." || segment.contains(['\\', ':', '\0']) {
            return None;
        }
        path.push(segment);
    }
    if path.is_dir() {
        path.push("index.html");
    }
    Some(path)
}

fn content_type(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain; charset=utf-8",
        _ => document::content_type_for(path),
    }
}
