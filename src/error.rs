//! Crate-wide error type.
//!
//! Handlers return `Result<Reply, ShellError>`; the dispatcher turns the error
//! into a status code and message, so no single request can take the server down.

use thiserror::Error;

use crate::render::RenderError;

#[derive(Error, Debug)]
pub enum ShellError {
    /// The loopback port could not be bound for a reason other than another instance.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Document write failure on save; reported to the editor as a JSON error body.
    #[error("{0}")]
    SaveFailed(String),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Handover failed: {0}")]
    Handover(String),

    #[cfg(target_os = "windows")]
    #[error("Windows API error: {0}")]
    Win32(#[from] windows::core::Error),
}

impl ShellError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Json(_) | Self::Base64(_) | Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Bind { .. }
            | Self::Io(_)
            | Self::SaveFailed(_)
            | Self::Render(_)
            | Self::Platform(_)
            | Self::Handover(_) => 500,
            #[cfg(target_os = "windows")]
            Self::Win32(_) => 500,
        }
    }
}

pub type Result<T, E = ShellError> = std::result::Result<T, E>;
