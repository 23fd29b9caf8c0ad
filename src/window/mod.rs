//! Win32 side of the shell: the tray icon, its hidden message window and the
//! common file dialogs.

mod dialogs;
mod tray;

use std::path::PathBuf;

use windows::Win32::{
    Foundation::CloseHandle,
    System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess},
};

use crate::{
    error::Result,
    platform::{NativeShell, SaveFilter, launch_browser},
};

pub struct WindowsShell;

impl WindowsShell {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsShell {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeShell for WindowsShell {
    fn show_open_dialog(&self) -> Option<PathBuf> {
        dialogs::pick_open_file()
    }

    fn show_save_dialog(&self, filter: SaveFilter) -> Option<PathBuf> {
        dialogs::pick_save_file(filter)
    }

    fn open_url(&self, url: &str) {
        launch_browser(url);
    }

    fn run_tray(&self, editor_url: &str) -> Result<()> {
        let tray = tray::TrayWindow::new(editor_url)?;
        tray.run();
        Ok(())
    }
}

pub fn terminate_process(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(handle) = (unsafe { OpenProcess(PROCESS_TERMINATE, false, pid) }) else {
        return false;
    };
    let result = unsafe { TerminateProcess(handle, 1) };
    let _ = unsafe { CloseHandle(handle) };
    result.is_ok()
}
