use super::backend::StorageBackend;
use super::Tables;
use crate::error::{Result, RowkeepError};
use parking_lot::{Mutex, RwLock};

/// In-memory storage backend.
///
/// Uses `parking_lot::RwLock` so readers never block each other and the
/// backend can be shared across request threads.
#[derive(Default)]
pub struct MemBackend {
    tables: RwLock<Tables>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct Faults {
    conflicts: usize,
    write_error: bool,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` commits with a concurrency conflict.
    pub fn simulate_conflicts(&self, n: usize) {
        self.faults.lock().conflicts = n;
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.faults.lock().write_error = simulate;
    }
}

impl StorageBackend for MemBackend {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        f(&*self.tables.read())
    }

    fn commit(&self, next: &Tables) -> Result<()> {
        {
            let mut faults = self.faults.lock();
            if faults.write_error {
                return Err(RowkeepError::Store("Simulated write error".to_string()));
            }
            if faults.conflicts > 0 {
                faults.conflicts -= 1;
                return Err(RowkeepError::Concurrency("simulated concurrent writer".to_string()));
            }
        }

        let mut current = self.tables.write();
        if next.generation != current.generation + 1 {
            return Err(RowkeepError::Concurrency(format!(
                "generation {} was committed by another writer",
                current.generation + 1
            )));
        }
        *current = next.clone();
        Ok(())
    }
}
