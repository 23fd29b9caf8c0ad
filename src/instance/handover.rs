//! Secondary-instance side of the file handover.

use std::{fs, path::Path};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use super::LaunchArgs;
use crate::{
    config::ShellConfig,
    error::{Result, ShellError},
    platform::NativeShell,
};

/// Body of `POST /api/cli-handover`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverRequest {
    pub file_name: String,
    /// Base64 (standard alphabet) of the raw file bytes.
    pub data: String,
}

/// Passes this launch on to the running primary. Never fails visibly.
pub fn hand_over(args: &LaunchArgs, config: &ShellConfig, shell: &dyn NativeShell) {
    let Some(file) = &args.file else {
        shell.open_url(&config.base_url());
        return;
    };

    match send_file(file, &config.base_url(), config) {
        Ok(Some(id)) => tracing::info!(%id, file = %file.display(), "file handed over"),
        Ok(None) => tracing::debug!(file = %file.display(), "argument is not a file"),
        Err(error) => tracing::warn!(file = %file.display(), %error, "handover failed"),
    }
}

/// `Ok(None)` when `file` does not name a regular file.
pub fn send_file(file: &Path, base_url: &str, config: &ShellConfig) -> Result<Option<String>> {
    let path = std::path::absolute(file)?;
    if !fs::metadata(&path).is_ok_and(|meta| meta.is_file()) {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    let body = HandoverRequest {
        file_name: path.to_string_lossy().into_owned(),
        data: STANDARD.encode(bytes),
    };

    let agent = ureq::AgentBuilder::new()
        .timeout(config.handover_timeout)
        .build();
    let response = agent
        .post(&format!("{base_url}/api/cli-handover"))
        .send_json(&body)
        .map_err(|error| ShellError::Handover(error.to_string()))?;
    let id = response
        .into_string()
        .map_err(|error| ShellError::Handover(error.to_string()))?;
    Ok(Some(id.trim().to_string()))
}
