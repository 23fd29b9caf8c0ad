use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io,
    path::{Component, Path, PathBuf},
};

use parking_lot::Mutex;

/// Read handles held open for documents with unsaved changes in the editor.
///
/// On Windows the handle is opened without delete sharing, so Explorer and other
/// programs cannot delete or rename the file while the lock is held. Writes are
/// still allowed. Elsewhere the handle is purely advisory.
#[derive(Default)]
pub struct FileLockRegistry {
    handles: Mutex<HashMap<String, File>>,
}

impl FileLockRegistry {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort: failures to open the file are logged and dropped.
    pub fn lock(&self, path: &Path) {
        let key = lock_key(path);
        let mut handles = self.handles.lock();
        if handles.contains_key(&key) {
            return;
        }

        match open_guard(path) {
            Ok(file) => {
                tracing::debug!(path = %path.display(), "file locked");
                handles.insert(key, file);
            }
            Err(error) => {
                tracing::debug!(path = %path.display(), %error, "file lock skipped");
            }
        }
    }

    pub fn unlock(&self, path: &Path) {
        let key = lock_key(path);
        if self.handles.lock().remove(&key).is_some() {
            tracing::debug!(path = %path.display(), "file unlocked");
        }
    }

    pub fn unlock_all(&self) {
        let mut handles = self.handles.lock();
        let released = handles.len();
        handles.clear();
        if released > 0 {
            tracing::info!(released, "released all file locks");
        }
    }

    #[cfg(test)]
    pub fn is_locked(&self, path: &Path) -> bool {
        self.handles.lock().contains_key(&lock_key(path))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn lock_key(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let key = normalize_lexically(&absolute)
        .to_string_lossy()
        .into_owned();
    if cfg!(windows) { key.to_lowercase() } else { key }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn open_guard(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);

    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        use windows::Win32::Storage::FileSystem::{FILE_SHARE_READ, FILE_SHARE_WRITE};

        options.share_mode((FILE_SHARE_READ | FILE_SHARE_WRITE).0);
    }

    options.open(path)
}
