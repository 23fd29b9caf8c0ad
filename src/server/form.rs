//! `multipart/form-data` body of `POST /api/save-file`.

use std::io::Read;

use multipart::server::Multipart;

use crate::error::{Result, ShellError};

#[derive(Debug, Default)]
pub struct SaveForm {
    pub file_path: String,
    pub html: Vec<u8>,
    pub assets: Vec<AssetUpload>,
}

#[derive(Debug)]
pub struct AssetUpload {
    /// Final path component only; directory parts sent by the client are dropped.
    pub file_name: String,
    pub data: Vec<u8>,
}

pub fn boundary_of(content_type: &str) -> Option<&str> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

pub fn parse_save_form(content_type: Option<&str>, body: impl Read, limit: u64) -> Result<SaveForm> {
    let boundary = content_type
        .and_then(boundary_of)
        .ok_or_else(|| ShellError::bad_request("Expected multipart/form-data"))?;

    let mut multipart = Multipart::with_body(body.take(limit), boundary);
    let mut form = SaveForm::default();
    let mut has_html = false;

    while let Some(mut field) = multipart
        .read_entry()
        .map_err(|error| ShellError::bad_request(format!("Failed to parse form: {error}")))?
    {
        let mut data = Vec::new();
        field
            .data
            .read_to_end(&mut data)
            .map_err(|error| ShellError::bad_request(format!("Failed to parse form: {error}")))?;

        match &*field.headers.name {
            "filePath" => form.file_path = String::from_utf8_lossy(&data).trim().to_string(),
            "html" => {
                form.html = data;
                has_html = true;
            }
            "assets" => {
                let declared = field.headers.filename.as_deref().unwrap_or_default();
                match base_name(declared) {
                    Some(file_name) => form.assets.push(AssetUpload {
                        file_name: file_name.to_string(),
                        data,
                    }),
                    None => tracing::debug!(declared, "skipping asset without a usable name"),
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    if form.file_path.is_empty() {
        return Err(ShellError::bad_request("File path is empty"));
    }
    if !has_html {
        return Err(ShellError::bad_request("Content file part missing"));
    }
    Ok(form)
}

fn base_name(declared: &str) -> Option<&str> {
    let name = declared.rsplit(['/', '\\']).next()?.trim();
    (!name.is_empty() && name != "." && name != "..").then_some(name)
}
