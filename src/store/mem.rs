//! In-memory store for unit tests: BTreeMap collections, optional read fault
//! after N entries, and a counter of released snapshots.

use anyhow::{anyhow, Result};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{SnapshotView, Store, Visit};

#[derive(Default)]
pub(crate) struct MemStore {
    collections: BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
    // коллекция -> после скольких записей падать
    faults: BTreeMap<String, usize>,
    begun: Cell<usize>,
    released: Cell<usize>,
    path: PathBuf,
}

impl MemStore {
    pub(crate) fn new() -> Self {
        Self {
            path: PathBuf::from("mem://store"),
            ..Default::default()
        }
    }

    pub(crate) fn with_collection(mut self, name: &str, entries: &[(&[u8], &[u8])]) -> Self {
        let c = self.collections.entry(name.to_string()).or_default();
        for (k, v) in entries {
            c.insert(k.to_vec(), v.to_vec());
        }
        self
    }

    pub(crate) fn with_fault_after(mut self, name: &str, after: usize) -> Self {
        self.faults.insert(name.to_string(), after);
        self
    }

    pub(crate) fn begun(&self) -> usize {
        self.begun.get()
    }

    pub(crate) fn released(&self) -> usize {
        self.released.get()
    }
}

pub(crate) struct MemSnapshot<'s> {
    store: &'s MemStore,
}

impl Store for MemStore {
    type Snapshot<'s> = MemSnapshot<'s>;

    fn begin(&self) -> Result<MemSnapshot<'_>> {
        self.begun.set(self.begun.get() + 1);
        Ok(MemSnapshot { store: self })
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

impl SnapshotView for MemSnapshot<'_> {
    fn scan_collection(&self, name: &str, visit: &mut Visit<'_>) -> Result<Option<usize>> {
        let Some(c) = self.store.collections.get(name) else {
            return Ok(None);
        };
        let fault_at = self.store.faults.get(name).copied();
        let mut n = 0;
        for (k, v) in c {
            if fault_at == Some(n) {
                return Err(anyhow!("injected I/O error at entry #{}", n));
            }
            visit(k.as_slice(), v.as_slice())?;
            n += 1;
        }
        Ok(Some(n))
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.store.collections.keys().cloned().collect())
    }
}

impl Drop for MemSnapshot<'_> {
    fn drop(&mut self) {
        self.store.released.set(self.store.released.get() + 1);
    }
}
