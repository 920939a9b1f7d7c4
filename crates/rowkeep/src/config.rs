//! # Configuration
//!
//! Rowkeep configuration is managed by [`confique`], loaded in priority order:
//!
//! 1. **Environment variables**: `ROWKEEP_DATA_DIR`, `ROWKEEP_MAX_RETRIES`, etc.
//! 2. **Config file**: an optional `rowkeep.toml` passed to [`RowkeepConfig::load`].
//! 3. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `data_dir` | none | Root of the file store; in-memory when absent |
//! | `store_file` | `rowkeep.json` | Name of the data file under `data_dir` |
//! | `superuser_role` | `SuperAdmin` | Role that bypasses row permissions |
//! | `max_retries` | `2` | Retries for conflicting transactions |
//! | `retry_base_delay_ms` | `5` | First backoff delay |
//! | `retry_max_delay_ms` | `50` | Backoff cap |
//! | `default_page_size` | `25` | Page size when a query names none |
//! | `max_page_size` | `100` | Upper bound on requested page sizes |
//! | `media_bucket` | `row-media` | Bucket handed to blob storage |

use crate::error::Result;
use crate::query::Page;
use crate::store::RetryConfig;
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RowkeepConfig {
    /// Directory holding the data file. In-memory store when unset.
    #[config(env = "ROWKEEP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[config(env = "ROWKEEP_STORE_FILE", default = "rowkeep.json")]
    pub store_file: String,

    #[config(env = "ROWKEEP_SUPERUSER_ROLE", default = "SuperAdmin")]
    pub superuser_role: String,

    #[config(env = "ROWKEEP_MAX_RETRIES", default = 2)]
    pub max_retries: usize,

    #[config(env = "ROWKEEP_RETRY_BASE_DELAY_MS", default = 5)]
    pub retry_base_delay_ms: u64,

    #[config(env = "ROWKEEP_RETRY_MAX_DELAY_MS", default = 50)]
    pub retry_max_delay_ms: u64,

    #[config(env = "ROWKEEP_DEFAULT_PAGE_SIZE", default = 25)]
    pub default_page_size: usize,

    #[config(env = "ROWKEEP_MAX_PAGE_SIZE", default = 100)]
    pub max_page_size: usize,

    #[config(env = "ROWKEEP_MEDIA_BUCKET", default = "row-media")]
    pub media_bucket: String,
}

impl Default for RowkeepConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            store_file: "rowkeep.json".to_string(),
            superuser_role: "SuperAdmin".to_string(),
            max_retries: 2,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 50,
            default_page_size: 25,
            max_page_size: 100,
            media_bucket: "row-media".to_string(),
        }
    }
}

impl RowkeepConfig {
    /// Environment first, then `file` if given, then defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(path) = file {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.max_retries)
            .with_base_delay_ms(self.retry_base_delay_ms)
            .with_max_delay_ms(self.retry_max_delay_ms)
    }

    /// Page request with the size defaulted and clamped to `max_page_size`.
    pub fn page(&self, page: usize, page_size: Option<usize>) -> Page {
        let size = page_size
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size.max(1));
        Page::new(page, size)
    }
}
