use std::path::PathBuf;

use super::{NativeShell, SaveFilter, launch_browser};
use crate::error::Result;

/// Non-Windows stand-in: no dialogs and no tray, the process stays up until killed
/// or until `/api/kill` is called.
pub struct FallbackShell;

impl NativeShell for FallbackShell {
    fn show_open_dialog(&self) -> Option<PathBuf> {
        tracing::debug!("native open dialog unavailable on this platform");
        None
    }

    fn show_save_dialog(&self, filter: SaveFilter) -> Option<PathBuf> {
        tracing::debug!(?filter, "native save dialog unavailable on this platform");
        None
    }

    fn open_url(&self, url: &str) {
        launch_browser(url);
    }

    fn run_tray(&self, editor_url: &str) -> Result<()> {
        tracing::info!(editor_url, "no tray on this platform; blocking main thread");
        loop {
            std::thread::park();
        }
    }
}
