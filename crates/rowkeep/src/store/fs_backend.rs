use super::backend::StorageBackend;
use super::Tables;
use crate::error::{Result, RowkeepError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Lock file next to the data file. Every commit holds an exclusive lock on
/// it, so handles in other threads or processes cannot interleave.
const LOCK_FILE: &str = ".rowkeep.lock";

/// JSON-file backend: the whole state lives in one file under `root`.
pub struct FsBackend {
    root: PathBuf,
    file_name: String,
}

impl FsBackend {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            file_name: "rowkeep.json".to_string(),
        }
    }

    pub fn with_file_name(mut self, name: &str) -> Self {
        self.file_name = name.to_string();
        self
    }

    pub fn data_file(&self) -> PathBuf {
        self.root.join(&self.file_name)
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(RowkeepError::Io)?;
        }
        Ok(())
    }

    /// Blocks until this handle holds the directory's write lock. Released
    /// when the returned file is dropped.
    fn lock(&self) -> Result<File> {
        self.ensure_dir(&self.root)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.root.join(LOCK_FILE))
            .map_err(RowkeepError::Io)?;
        file.lock_exclusive().map_err(RowkeepError::Io)?;
        Ok(file)
    }

    fn load(&self) -> Result<Tables> {
        let data_file = self.data_file();
        if !data_file.exists() {
            return Ok(Tables::default());
        }
        let content = fs::read_to_string(data_file).map_err(RowkeepError::Io)?;
        let tables: Tables = serde_json::from_str(&content).map_err(RowkeepError::Serialization)?;
        Ok(tables)
    }
}

impl StorageBackend for FsBackend {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        f(&self.load()?)
    }

    fn commit(&self, next: &Tables) -> Result<()> {
        let _lock = self.lock()?;
        let committed = self.load()?.generation;
        if next.generation != committed + 1 {
            return Err(RowkeepError::Concurrency(format!(
                "{} changed on disk (generation {})",
                self.file_name, committed
            )));
        }

        let content = serde_json::to_string_pretty(next).map_err(RowkeepError::Serialization)?;

        // Atomic write
        let tmp_file = self.root.join(format!(".rowkeep-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_file, content).map_err(RowkeepError::Io)?;
        fs::rename(&tmp_file, self.data_file()).map_err(RowkeepError::Io)?;
        Ok(())
    }
}
