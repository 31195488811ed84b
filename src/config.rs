//! Export configuration.
//!
//! Everything the pipeline needs is passed in explicitly: the source store, the
//! collection list, the destination and the value encoding. Nothing is a global.
//!
//! Precedence: CLI flags > environment (SNAPDUMP_*) > defaults.
//!
//! Defaults:
//! - store_path = ./store (каталог LMDB-окружения)
//! - collections = пусто: список обязателен (флаг или SNAPDUMP_COLLECTIONS)
//! - out_path = ./export.json
//!
//! Читается только формат LMDB; bolt-файлы (bbolt/BoltDB) не поддерживаются.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::document::ValueEncoding;

pub const DEFAULT_STORE_PATH: &str = "store";
pub const DEFAULT_OUT_PATH: &str = "export.json";
pub const DEFAULT_MAX_COLLECTIONS: u32 = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    /// LMDB environment directory or single data file.
    /// Env: SNAPDUMP_STORE
    pub store_path: PathBuf,

    /// Collections to export, in output order.
    /// Env: SNAPDUMP_COLLECTIONS = "a,b,c"
    pub collections: Vec<String>,

    /// Destination JSON document. Its directory must already exist.
    /// Env: SNAPDUMP_OUT
    pub out_path: PathBuf,

    /// How opaque values are embedded into the document.
    /// Env: SNAPDUMP_VALUES = json|base64 (default json)
    pub value_encoding: ValueEncoding,

    /// Upper bound of named databases resolvable in one run (LMDB max_dbs).
    /// Env: SNAPDUMP_MAX_COLLECTIONS (default 128)
    pub max_collections: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            collections: Vec::new(),
            out_path: PathBuf::from(DEFAULT_OUT_PATH),
            value_encoding: ValueEncoding::Json,
            max_collections: DEFAULT_MAX_COLLECTIONS,
        }
    }
}

impl ExportConfig {
    /// Defaults overridden by SNAPDUMP_* variables. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SNAPDUMP_STORE") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.store_path = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("SNAPDUMP_COLLECTIONS") {
            let list = parse_collection_list(&v);
            if !list.is_empty() {
                cfg.collections = list;
            }
        }

        if let Ok(v) = std::env::var("SNAPDUMP_OUT") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.out_path = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("SNAPDUMP_VALUES") {
            if let Ok(enc) = v.parse::<ValueEncoding>() {
                cfg.value_encoding = enc;
            }
        }

        if let Ok(v) = std::env::var("SNAPDUMP_MAX_COLLECTIONS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                if n > 0 {
                    cfg.max_collections = n;
                }
            }
        }

        cfg
    }

    pub fn with_store_path<P: Into<PathBuf>>(mut self, p: P) -> Self {
        self.store_path = p.into();
        self
    }

    pub fn with_collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_out_path<P: Into<PathBuf>>(mut self, p: P) -> Self {
        self.out_path = p.into();
        self
    }

    pub fn with_value_encoding(mut self, enc: ValueEncoding) -> Self {
        self.value_encoding = enc;
        self
    }

    pub fn with_max_collections(mut self, n: u32) -> Self {
        self.max_collections = n.max(1);
        self
    }
}

/// "a, b,,c" -> ["a", "b", "c"]
pub fn parse_collection_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .collect()
}

impl FromStr for ValueEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "raw" => Ok(ValueEncoding::Json),
            "base64" | "b64" => Ok(ValueEncoding::Base64),
            other => Err(anyhow!("unknown value encoding '{}' (expected json|base64)", other)),
        }
    }
}

impl fmt::Display for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExportConfig {{ \
             store_path: {}, \
             collections: [{}], \
             out_path: {}, \
             value_encoding: {}, \
             max_collections: {} \
             }}",
            self.store_path.display(),
            self.collections.join(", "),
            self.out_path.display(),
            self.value_encoding,
            self.max_collections,
        )
    }
}
