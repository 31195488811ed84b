//! Ошибки экспорта.
//!
//! Два уровня:
//! - ExportError — фатальные (store не открылся, документ не записан). Прерывают запуск.
//! - CollectionError — ошибки одной коллекции (нет такой, сбой чтения, значение
//!   нельзя встроить). Логируются, коллекция пропускается, экспорт продолжается.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors: the run stops and exits non-zero.
/// Причина лежит только в source(), в Display её нет: `{:#}` печатает цепочку один раз.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Store file/environment missing, unreadable or corrupt at open time.
    #[error("store unavailable at {path}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        cause: anyhow::Error,
    },

    /// Output artifact could not be created or written.
    #[error("cannot write {path}")]
    DestinationWriteError {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("serialize export document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-collection failure. Never aborts the run.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("bucket not found: {0}")]
    NotFound(String),

    /// I/O or decode fault mid-walk; entries already read are discarded.
    #[error("read fault in {collection}: {cause}")]
    ReadFault { collection: String, cause: String },

    /// A value cannot be embedded under the selected value encoding.
    #[error("value of key {key:?} in {collection} cannot be embedded: {cause}")]
    Unencodable {
        collection: String,
        key: String,
        cause: String,
    },
}

impl CollectionError {
    pub(crate) fn read_fault(collection: &str, cause: &anyhow::Error) -> Self {
        CollectionError::ReadFault {
            collection: collection.to_string(),
            cause: format!("{:#}", cause),
        }
    }

    /// Name of the collection this failure belongs to.
    pub fn collection(&self) -> &str {
        match self {
            CollectionError::NotFound(name) => name,
            CollectionError::ReadFault { collection, .. } => collection,
            CollectionError::Unencodable { collection, .. } => collection,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CollectionError::NotFound(_))
    }
}
