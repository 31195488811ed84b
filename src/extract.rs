//! extract — материализация коллекций из одного snapshot.
//!
//! Семантика:
//! - Порядок записей — родной порядок стора (байтовый, по возрастанию ключа), без пересортировки.
//! - Значения копируются как есть: никакого разбора, валидации или перекодирования.
//! - Ключ должен быть UTF-8; иначе это decode fault -> ReadFault.
//! - Сбой посреди обхода отбрасывает уже прочитанное: коллекция целиком failed.
//! - Сбой одной коллекции не влияет на остальные.

use anyhow::anyhow;
use log::{debug, warn};
use std::collections::HashSet;

use crate::error::CollectionError;
use crate::store::SnapshotView;

/// One key/value pair; the value is opaque bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

pub type ExtractionResult = Result<Vec<Entry>, CollectionError>;

/// Extract a single collection from the snapshot.
pub fn extract<S: SnapshotView + ?Sized>(snap: &S, name: &str) -> ExtractionResult {
    let mut entries: Vec<Entry> = Vec::new();

    let walked = snap.scan_collection(name, &mut |k, v| {
        let key = std::str::from_utf8(k)
            .map_err(|e| anyhow!("key #{} is not UTF-8: {}", entries.len(), e))?;
        entries.push(Entry {
            key: key.to_string(),
            value: v.to_vec(),
        });
        Ok(())
    });

    match walked {
        Ok(Some(n)) => {
            debug!("extracted {} entries from {}", n, name);
            Ok(entries)
        }
        Ok(None) => Err(CollectionError::NotFound(name.to_string())),
        // частичный результат выбрасываем вместе с entries
        Err(e) => Err(CollectionError::read_fault(name, &e)),
    }
}

/// Extract every requested collection from the same snapshot, keeping request order.
/// Repeated names are extracted once (first occurrence wins).
pub fn extract_all<S, I, N>(snap: &S, names: I) -> Vec<(String, ExtractionResult)>
where
    S: SnapshotView + ?Sized,
    I: IntoIterator<Item = N>,
    N: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let name = name.as_ref();
        if !seen.insert(name.to_string()) {
            warn!("collection {} requested more than once; exporting it once", name);
            continue;
        }
        let res = extract(snap, name);
        if let Err(e) = &res {
            warn!("{}", e);
        }
        out.push((name.to_string(), res));
    }
    out
}
