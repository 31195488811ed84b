//! export — весь конвейер: open -> snapshot -> extract* -> release -> assemble -> write.
//!
//! Фатально только два случая: store не открылся (до извлечения) и документ не
//! записан (после сборки). Ошибки отдельных коллекций попадают в отчёт.

use log::{info, warn};
use std::path::PathBuf;

use crate::config::ExportConfig;
use crate::document::{assemble, Assembled};
use crate::error::{CollectionError, ExportError};
use crate::extract::extract_all;
use crate::session::{close, open, with_snapshot};
use crate::store::Store;

/// Outcome of a run that produced a document.
#[derive(Debug)]
pub struct ExportReport {
    pub destination: PathBuf,
    /// (collection, entry count) in document order.
    pub exported: Vec<(String, usize)>,
    /// Requested collections left out of the document.
    pub failures: Vec<CollectionError>,
}

impl ExportReport {
    /// True when every requested collection made it into the document.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn entries_total(&self) -> usize {
        self.exported.iter().map(|(_, n)| *n).sum()
    }
}

/// Open the configured store and export from it.
pub fn export(cfg: &ExportConfig) -> Result<ExportReport, ExportError> {
    let store = open(&cfg.store_path, cfg)?;
    let report = export_from(&store, cfg);
    close(store);
    report
}

/// Export from an already opened store. All collections are read from one snapshot.
pub fn export_from<S: Store>(store: &S, cfg: &ExportConfig) -> Result<ExportReport, ExportError> {
    let results = with_snapshot(store, |snap| extract_all(snap, &cfg.collections))?;

    let Assembled { document, failures } = assemble(results, cfg.value_encoding);
    let exported = document
        .collection_names()
        .into_iter()
        .map(|n| (n.to_string(), document.entry_count(n).unwrap_or(0)))
        .collect::<Vec<_>>();

    document.write(&cfg.out_path)?;

    let report = ExportReport {
        destination: cfg.out_path.clone(),
        exported,
        failures,
    };
    if report.is_complete() {
        info!(
            "exported {} collection(s), {} entries to {}",
            report.exported.len(),
            report.entries_total(),
            report.destination.display()
        );
    } else {
        warn!(
            "partial export: {} collection(s) written, {} skipped, to {}",
            report.exported.len(),
            report.failures.len(),
            report.destination.display()
        );
    }
    Ok(report)
}
