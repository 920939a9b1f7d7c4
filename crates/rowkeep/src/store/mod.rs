//! # Storage Layer
//!
//! The [`DataStore`] trait is the handle every command receives. It exposes two
//! things: consistent reads, and atomic write transactions.
//!
//! ## Transactions
//!
//! [`DataStore::transaction`] runs a closure against a private copy of the
//! [`Tables`]:
//!
//! 1. Take the in-process writer lock.
//! 2. Snapshot the committed state.
//! 3. Apply the closure. Any error discards the copy.
//! 4. Check integrity, including the unique `(tenant, entity, parent, folio)` key.
//! 5. Commit with the next generation number.
//!
//! A row, its values, detail rows and visibility grant therefore commit
//! together or not at all.
//!
//! ## Folio assignment
//!
//! Folios are `max + 1` within their scope, computed inside the transaction.
//! Writers in one process are serialized by the writer lock, so they never
//! race. Writers in other processes (several handles on one data file) are
//! caught by the generation check at commit; the folio constraint is verified
//! again on every commit. Both surface as `Concurrency` errors, which
//! [`Store`] retries on fresh state according to its [`RetryConfig`]. Once the
//! retries are spent the conflict is returned to the caller.
//!
//! ## Implementations
//!
//! - [`memory::InMemoryStore`]: memory-backed, for tests and embedding.
//! - [`fs::FileStore`]: one JSON file written with tmp + rename.
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//! └── rowkeep.json    # every table + generation counter
//! ```

use crate::error::{Result, RowkeepError};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub mod backend;
pub mod fs;
pub mod fs_backend;
pub mod mem_backend;
pub mod memory;
mod tables;

pub use tables::Tables;

/// Abstract interface over a transactional store.
pub trait DataStore: Send + Sync {
    /// Run `f` against the committed state.
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T>;

    /// Run `f` as one atomic write. `f` may run more than once when a
    /// conflicting commit forces a retry, so it must not have side effects
    /// outside the tables it is given.
    fn transaction<T>(&self, f: impl Fn(&mut Tables) -> Result<T>) -> Result<T>;
}

/// Retry behaviour for conflicting transactions (exponential backoff).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 5,
            max_delay_ms: 50,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        let shift = attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// A [`DataStore`] over any [`backend::StorageBackend`].
pub struct Store<B: backend::StorageBackend> {
    backend: B,
    retry: RetryConfig,
    writer: Mutex<()>,
}

impl<B: backend::StorageBackend> Store<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            retry: RetryConfig::default(),
            writer: Mutex::new(()),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    fn attempt<T>(&self, f: &impl Fn(&mut Tables) -> Result<T>) -> Result<T> {
        let _writer = self.writer.lock();
        let mut tables = self.backend.snapshot()?;
        let value = f(&mut tables)?;
        tables.check_constraints()?;
        tables.generation += 1;
        self.backend.commit(&tables)?;
        Ok(value)
    }
}

impl<B: backend::StorageBackend> DataStore for Store<B> {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        self.backend.read(f)
    }

    fn transaction<T>(&self, f: impl Fn(&mut Tables) -> Result<T>) -> Result<T> {
        let max = self.retry.max_retries;
        for attempt in 0..=max {
            match self.attempt(&f) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_conflict() && attempt < max => {
                    let delay = self.retry.calculate_delay(attempt);
                    debug!(
                        target: "rowkeep::store",
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying transaction after conflict"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) if e.is_conflict() => {
                    warn!(target: "rowkeep::store", retries = max, error = %e, "Transaction retries exhausted");
                    return Err(RowkeepError::Concurrency(format!(
                        "gave up after {} retries: {}",
                        max, e
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        Err(RowkeepError::Concurrency(
            "retry loop exited without a result".to_string(),
        ))
    }
}
