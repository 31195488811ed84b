//! snapdump — согласованный (point-in-time) экспорт именованных коллекций
//! из LMDB-хранилища в один JSON-документ.
//!
//! Конвейер: session (snapshot) -> extract (коллекции) -> document (сборка, запись).

pub mod config;
pub mod error;

// Граница со стором (heed/LMDB) и snapshot-сессия
pub mod store;
pub mod session;

// Ядро экспорта
pub mod extract;
pub mod document;
pub mod export;

pub mod cli;

// Удобные реэкспорты
pub use config::ExportConfig;
pub use document::{assemble, decode_document, Assembled, ExportDocument, ValueEncoding};
pub use error::{CollectionError, ExportError};
pub use export::{export, export_from, ExportReport};
pub use extract::{extract, extract_all, Entry, ExtractionResult};
pub use store::{LmdbSnapshot, LmdbStore, SnapshotView, Store};
