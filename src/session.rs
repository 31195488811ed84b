//! session — open store / with_snapshot / close.
//!
//! with_snapshot держит ровно один snapshot на всё время работы замыкания и
//! освобождает его на любом пути выхода (Ok, Err, panic/unwind): snapshot живёт
//! в локальной переменной: обычный путь — release(), при unwind — Drop.

use log::{debug, warn};
use std::path::Path;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::store::{LmdbStore, SnapshotView, Store};

/// Open the store read-only. Failure is `StoreUnavailable`.
pub fn open(store_path: &Path, cfg: &ExportConfig) -> Result<LmdbStore, ExportError> {
    LmdbStore::open(store_path, cfg)
}

/// Run `f` inside one snapshot of `store`.
pub fn with_snapshot<S, R, F>(store: &S, f: F) -> Result<R, ExportError>
where
    S: Store,
    F: FnOnce(&dyn SnapshotView) -> R,
{
    let snap = store
        .begin()
        .map_err(|cause| ExportError::StoreUnavailable {
            path: store.location().to_path_buf(),
            cause,
        })?;
    debug!("snapshot begun on {}", store.location().display());

    let out = f(&snap);

    // данные уже извлечены; сбой завершения txn их не портит
    if let Err(e) = snap.release() {
        warn!("release snapshot on {}: {:#}", store.location().display(), e);
    }
    debug!("snapshot released on {}", store.location().display());
    Ok(out)
}

/// Close the store handle. The environment is closed once no handle is left.
pub fn close<S: Store>(store: S) {
    debug!("closing store {}", store.location().display());
    drop(store);
}
