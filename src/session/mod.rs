//! Process-lifetime coordination state shared by every HTTP handler.
//!
//! Each member synchronises itself; no operation spans two of them.

pub mod locks;
pub mod stores;

pub use locks::FileLockRegistry;
pub use stores::{FileStore, HandoverPayload, RenderStore};

#[derive(Default)]
pub struct Session {
    pub files: FileStore,
    pub renders: RenderStore,
    pub locks: FileLockRegistry,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}
