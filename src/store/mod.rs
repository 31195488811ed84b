//! store — граница с движком хранения.
//!
//! - mod.rs  — трейты Store / SnapshotView (то, что видит ядро экспорта)
//! - lmdb.rs — единственная боевая реализация поверх heed (LMDB, MVCC read txn)
//! - mem.rs  — in-memory фейк для unit-тестов (инъекция сбоев, подсчёт release)
//!
//! Snapshot освобождается ровно один раз: release() или Drop. Ссылок на него после
//! освобождения не бывает — это гарантирует владение.

use anyhow::Result;

pub mod lmdb;

#[cfg(test)]
pub(crate) mod mem;

pub use lmdb::{LmdbSnapshot, LmdbStore};

/// Callback for one entry: borrowed key and value bytes, valid only for the call.
pub type Visit<'v> = dyn FnMut(&[u8], &[u8]) -> Result<()> + 'v;

/// Read-only, point-in-time view of the whole store.
pub trait SnapshotView {
    /// Walk every entry of `name` in ascending key order.
    ///
    /// Returns `Ok(None)` if the collection does not exist in this snapshot,
    /// otherwise the number of visited entries. An error from `visit` stops the
    /// walk and is returned as is.
    fn scan_collection(&self, name: &str, visit: &mut Visit<'_>) -> Result<Option<usize>>;

    /// Names of all collections present in the snapshot, ascending.
    fn collection_names(&self) -> Result<Vec<String>>;

    /// Normal end of the snapshot. Dropping without `release` ends it too
    /// (unwind/error path); either way it happens once.
    fn release(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Something that can hand out snapshots.
pub trait Store {
    type Snapshot<'s>: SnapshotView
    where
        Self: 's;

    /// Begin a read-only transaction. Dropping the result releases it.
    fn begin(&self) -> Result<Self::Snapshot<'_>>;

    /// Human-readable location for logs and errors.
    fn location(&self) -> &std::path::Path;
}
