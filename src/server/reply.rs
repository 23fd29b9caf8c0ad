use std::io::Cursor;

use serde::Serialize;
use tiny_http::{Header, Response};

use crate::error::ShellError;

const CORS_HEADERS: &[(&str, &str)] = &[
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// Handler output; turned into a `tiny_http` response with CORS headers attached.
#[derive(Debug)]
pub struct Reply {
    status: u16,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn bytes(data: Vec<u8>, content_type: &str) -> Self {
        Self::ok().with_body(data).with_header("Content-Type", content_type)
    }

    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self::bytes(message.into().into_bytes(), "text/plain; charset=utf-8").with_status(status)
    }

    pub fn html(html: String) -> Self {
        Self::bytes(html.into_bytes(), "text/html; charset=utf-8")
    }

    pub fn json(value: &impl Serialize) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::bytes(body, "application/json"),
            Err(error) => Self::text(500, format!("Failed to encode response: {error}")),
        }
    }

    pub fn error(error: &ShellError) -> Self {
        match error {
            ShellError::SaveFailed(message) => {
                Self::json(&serde_json::json!({ "error": message })).with_status(error.status())
            }
            _ => Self::text(error.status(), error.to_string()),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut response = Response::from_data(self.body).with_status_code(self.status);
        let headers = CORS_HEADERS
            .iter()
            .map(|(name, value)| (*name, *value))
            .chain(self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())));
        for (name, value) in headers {
            match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                Ok(header) => response.add_header(header),
                Err(()) => tracing::debug!(name, "dropping unrepresentable header"),
            }
        }
        response
    }
}
