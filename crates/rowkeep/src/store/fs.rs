use super::fs_backend::FsBackend;
use super::Store;
use std::path::PathBuf;

/// File-backed store: every table in one JSON document under a data directory.
pub type FileStore = Store<FsBackend>;

impl FileStore {
    /// Open (or lazily create) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Store::with_backend(FsBackend::new(root.into()))
    }
}
