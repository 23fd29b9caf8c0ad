use std::{ffi::OsString, os::windows::ffi::OsStringExt, path::PathBuf};

use windows::{
    Win32::UI::{
        Controls::Dialogs::{
            GetOpenFileNameW, GetSaveFileNameW, OFN_EXPLORER, OFN_FILEMUSTEXIST,
            OFN_NOCHANGEDIR, OFN_OVERWRITEPROMPT, OFN_PATHMUSTEXIST, OPENFILENAMEW,
        },
        WindowsAndMessaging::GetForegroundWindow,
    },
    core::{PCWSTR, PWSTR, w},
};

use crate::platform::SaveFilter;

const PATH_BUFFER_LEN: usize = 4096;

const OPEN_FILTERS: &[(&str, &str)] = &[
    (
        "Supported Files",
        "*.html;*.htm;*.docx;*.pdf;*.md;*.markdown;*.txt;*.png;*.jpg;*.jpeg;*.webp;*.bmp",
    ),
    ("HTML Files (*.html;*.htm)", "*.html;*.htm"),
    ("Word Documents (*.docx)", "*.docx"),
    ("PDF Files (*.pdf)", "*.pdf"),
    ("Markdown Files (*.md;*.markdown)", "*.md;*.markdown"),
    ("Text Files (*.txt)", "*.txt"),
    ("Image Files", "*.png;*.jpg;*.jpeg;*.webp;*.bmp"),
    ("All Files (*.*)", "*.*"),
];

pub fn pick_open_file() -> Option<PathBuf> {
    let filter_wide = filter_string(OPEN_FILTERS);
    let mut file_buffer = vec![0u16; PATH_BUFFER_LEN];

    let mut open = OPENFILENAMEW {
        lStructSize: std::mem::size_of::<OPENFILENAMEW>() as u32,
        hwndOwner: unsafe { GetForegroundWindow() },
        lpstrFilter: PCWSTR::from_raw(filter_wide.as_ptr()),
        lpstrFile: PWSTR(file_buffer.as_mut_ptr()),
        nMaxFile: file_buffer.len() as u32,
        lpstrTitle: w!("Open File"),
        Flags: OFN_EXPLORER | OFN_FILEMUSTEXIST | OFN_PATHMUSTEXIST | OFN_NOCHANGEDIR,
        ..Default::default()
    };

    let ok = unsafe { GetOpenFileNameW(&mut open).as_bool() };
    if !ok {
        return None;
    }
    path_from_buffer(&file_buffer)
}

pub fn pick_save_file(filter: SaveFilter) -> Option<PathBuf> {
    let pattern = format!("*.{}", filter.default_extension());
    let filter_wide = filter_string(&[
        (filter.description(), pattern.as_str()),
        ("All Files (*.*)", "*.*"),
    ]);
    let default_ext = wide(filter.default_extension());
    let mut file_buffer = vec![0u16; PATH_BUFFER_LEN];

    let mut save = OPENFILENAMEW {
        lStructSize: std::mem::size_of::<OPENFILENAMEW>() as u32,
        hwndOwner: unsafe { GetForegroundWindow() },
        lpstrFilter: PCWSTR::from_raw(filter_wide.as_ptr()),
        lpstrFile: PWSTR(file_buffer.as_mut_ptr()),
        nMaxFile: file_buffer.len() as u32,
        lpstrDefExt: PCWSTR::from_raw(default_ext.as_ptr()),
        lpstrTitle: w!("Save As"),
        Flags: OFN_EXPLORER | OFN_OVERWRITEPROMPT | OFN_NOCHANGEDIR,
        ..Default::default()
    };

    let ok = unsafe { GetSaveFileNameW(&mut save).as_bool() };
    if !ok {
        return None;
    }
    path_from_buffer(&file_buffer)
}

/// Pairs of display name and pattern, each NUL-terminated, closed by a double NUL.
fn filter_string(filters: &[(&str, &str)]) -> Vec<u16> {
    let mut filter = String::new();
    for (name, pattern) in filters {
        filter.push_str(name);
        filter.push('\0');
        filter.push_str(pattern);
        filter.push('\0');
    }
    filter.push('\0');
    filter.encode_utf16().collect()
}

fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

fn path_from_buffer(buffer: &[u16]) -> Option<PathBuf> {
    let len = buffer.iter().position(|c| *c == 0).unwrap_or(buffer.len());
    if len == 0 {
        return None;
    }
    Some(PathBuf::from(OsString::from_wide(&buffer[..len])))
}
