//! Native desktop capabilities the shell needs from the OS.
//!
//! Every unsafe call into the windowing API lives behind [`NativeShell`]. The
//! Windows implementation is in `crate::window`; other targets get the inert
//! [`fallback::FallbackShell`] so the HTTP side still runs during development.

use std::{path::PathBuf, process::Command, sync::Arc};

use crate::error::Result;

pub mod fallback;

/// Filter set for the native save dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFilter {
    Pdf,
    Markdown,
    Html,
}

impl SaveFilter {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("pdf") => Self::Pdf,
            Some("md") => Self::Markdown,
            _ => Self::Html,
        }
    }

    pub fn default_extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "md",
            Self::Html => "html",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Pdf => "PDF Files (*.pdf)",
            Self::Markdown => "Markdown Files (*.md)",
            Self::Html => "HTML Files (*.html)",
        }
    }
}

pub trait NativeShell: Send + Sync {
    /// `None` when the user cancels.
    fn show_open_dialog(&self) -> Option<PathBuf>;

    /// `None` when the user cancels.
    fn show_save_dialog(&self, filter: SaveFilter) -> Option<PathBuf>;

    /// Opens `url` in the default browser. Fire-and-forget; failures are logged.
    fn open_url(&self, url: &str);

    /// Runs the tray icon and message loop on the calling thread until the user
    /// chooses Exit.
    fn run_tray(&self, editor_url: &str) -> Result<()>;
}

#[cfg(target_os = "windows")]
pub fn native() -> Arc<dyn NativeShell> {
    Arc::new(crate::window::WindowsShell::new())
}

#[cfg(not(target_os = "windows"))]
pub fn native() -> Arc<dyn NativeShell> {
    Arc::new(fallback::FallbackShell)
}

/// Launches the default browser without waiting for it.
pub fn launch_browser(url: &str) {
    let result = if cfg!(target_os = "windows") {
        Command::new("rundll32")
            .args(["url.dll,FileProtocolHandler", url])
            .spawn()
    } else if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => tracing::debug!(url, "browser launched"),
        Err(error) => tracing::warn!(url, %error, "failed to open default browser"),
    }
}

/// Detached browser launch after `delay`; nothing waits on the outcome.
pub fn launch_browser_later(shell: Arc<dyn NativeShell>, url: String, delay: std::time::Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        shell.open_url(&url);
    });
}

/// Hard-kills a process by id. Used when a headless render overruns its deadline.
#[cfg(target_os = "windows")]
pub fn terminate_process(pid: u32) -> bool {
    crate::window::terminate_process(pid)
}

#[cfg(unix)]
pub fn terminate_process(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe { libc::kill(pid, libc::SIGKILL) == 0 }
}

#[cfg(not(any(unix, target_os = "windows")))]
pub fn terminate_process(_pid: u32) -> bool {
    false
}
