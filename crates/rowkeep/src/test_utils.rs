use crate::api::RowkeepApi;
use crate::config::RowkeepConfig;
use crate::store::fs::FileStore;
use std::path::PathBuf;
use tempfile::TempDir;

/// A file store in a temporary directory that lives as long as the env.
pub struct TestEnv {
    // Keeps the directory alive until the test is done
    pub _temp_dir: TempDir,
    pub store: FileStore,
    pub root: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let store = FileStore::open(root.clone());
        Self {
            _temp_dir: temp_dir,
            store,
            root,
        }
    }

    /// A second handle on the same data file.
    pub fn reopen(&self) -> FileStore {
        FileStore::open(self.root.clone())
    }

    /// An API over the env's directory.
    pub fn api(&self) -> RowkeepApi<FileStore> {
        let config = RowkeepConfig {
            data_dir: Some(self.root.clone()),
            ..Default::default()
        };
        RowkeepApi::open(config).expect("data_dir is set")
    }

    pub fn leftover_tmp_files(&self) -> usize {
        std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                    .count()
            })
            .unwrap_or(0)
    }
}
