use super::Tables;
use crate::error::Result;

/// Abstract interface for raw storage I/O.
///
/// A backend persists one [`Tables`] value as a unit. `Store` handles the
/// "what" (transactions, retries, integrity checks); backends handle the "how"
/// (memory vs. a JSON file).
pub trait StorageBackend: Send + Sync {
    /// Run `f` against the current committed state.
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T>;

    /// Replace the committed state with `tables`.
    ///
    /// `tables.generation` must be exactly one past the committed generation;
    /// otherwise another writer got there first and the commit fails with a
    /// concurrency conflict. MUST be atomic: readers see either the old or the
    /// new state, never a mix.
    fn commit(&self, tables: &Tables) -> Result<()>;

    /// Clone of the committed state.
    fn snapshot(&self) -> Result<Tables> {
        self.read(|t| Ok(t.clone()))
    }
}
