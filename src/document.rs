//! document — сборка и запись итогового JSON-документа.
//!
//! Формат:
//! {
//!   "<collection>": [
//!     { "Key": "<key>", "Value": <value> },
//!     ...
//!   ],
//!   ...
//! }
//!
//! - Порядок коллекций = порядок запроса; порядок записей = порядок экстрактора.
//! - Отступ 2 пробела, в конце перевод строки.
//! - Value кодируется явно выбранным режимом (ValueEncoding), см. ниже.
//! - Запись атомарная: <dest>.<pid>.tmp + fsync + rename. Каталог назначения не создаётся.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use log::warn;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CollectionError, ExportError};
use crate::extract::{Entry, ExtractionResult};

/// How an opaque value is embedded into the document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueEncoding {
    /// Bytes are spliced in verbatim as a JSON fragment. Every value must be
    /// exactly one JSON text without surrounding whitespace; a collection
    /// holding anything else is rejected as a whole.
    #[default]
    Json,
    /// Bytes become a JSON string with standard padded base64. Always lossless.
    Base64,
}

impl fmt::Display for ValueEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueEncoding::Json => f.write_str("json"),
            ValueEncoding::Base64 => f.write_str("base64"),
        }
    }
}

impl ValueEncoding {
    fn encode(self, bytes: &[u8]) -> Result<EncodedValue> {
        match self {
            ValueEncoding::Json => {
                let text = std::str::from_utf8(bytes).context("value is not UTF-8")?;
                let raw = RawValue::from_string(text.to_string()).context("value is not JSON")?;
                // from_string срезает пробелы по краям — тогда байты уже не те же
                if raw.get().len() != text.len() {
                    return Err(anyhow!("value has leading or trailing whitespace"));
                }
                Ok(EncodedValue::Raw(raw))
            }
            ValueEncoding::Base64 => Ok(EncodedValue::Base64(B64.encode(bytes))),
        }
    }

    /// Reverse of the embedding: the exact stored bytes.
    pub fn decode(self, value: &RawValue) -> Result<Vec<u8>> {
        match self {
            ValueEncoding::Json => Ok(value.get().as_bytes().to_vec()),
            ValueEncoding::Base64 => {
                let s: String =
                    serde_json::from_str(value.get()).context("base64 value must be a string")?;
                B64.decode(s.as_bytes()).context("decode base64 value")
            }
        }
    }
}

#[derive(Debug)]
enum EncodedValue {
    Raw(Box<RawValue>),
    Base64(String),
}

impl Serialize for EncodedValue {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            EncodedValue::Raw(raw) => raw.serialize(s),
            EncodedValue::Base64(b) => s.serialize_str(b),
        }
    }
}

#[derive(Debug, Serialize)]
struct EncodedEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: EncodedValue,
}

/// The assembled artifact: collection name -> entries, in request order.
/// Immutable once built.
#[derive(Debug, Default)]
pub struct ExportDocument {
    collections: Vec<(String, Vec<EncodedEntry>)>,
}

/// Output of [`assemble`]: the document plus every collection left out of it.
#[derive(Debug)]
pub struct Assembled {
    pub document: ExportDocument,
    pub failures: Vec<CollectionError>,
}

/// Fold per-collection results into one document. Failed collections are
/// omitted from the document and returned in `failures`.
pub fn assemble<I>(results: I, encoding: ValueEncoding) -> Assembled
where
    I: IntoIterator<Item = (String, ExtractionResult)>,
{
    let mut document = ExportDocument::default();
    let mut failures = Vec::new();

    for (name, res) in results {
        match res.and_then(|entries| encode_collection(&name, entries, encoding)) {
            Ok(entries) => document.collections.push((name, entries)),
            Err(e) => failures.push(e),
        }
    }

    for f in &failures {
        if let CollectionError::Unencodable { .. } = f {
            warn!("{} (try --values base64)", f);
        }
    }

    Assembled { document, failures }
}

fn encode_collection(
    name: &str,
    entries: Vec<Entry>,
    encoding: ValueEncoding,
) -> Result<Vec<EncodedEntry>, CollectionError> {
    entries
        .into_iter()
        .map(|Entry { key, value }| match encoding.encode(&value) {
            Ok(value) => Ok(EncodedEntry { key, value }),
            Err(e) => Err(CollectionError::Unencodable {
                collection: name.to_string(),
                key,
                cause: format!("{:#}", e),
            }),
        })
        .collect()
}

impl Serialize for ExportDocument {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.collections.len()))?;
        for (name, entries) in &self.collections {
            map.serialize_entry(name, entries)?;
        }
        map.end()
    }
}

impl ExportDocument {
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of entries of `name`, None if the collection is not in the document.
    pub fn entry_count(&self, name: &str) -> Option<usize> {
        self.collections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.len())
    }

    /// Pretty JSON, two-space indent, trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    /// Write the document to `dest` all-or-nothing: either `dest` holds the
    /// complete document afterwards or an error is returned and `dest` is untouched.
    pub fn write(&self, dest: &Path) -> Result<(), ExportError> {
        let bytes = self.to_json_bytes()?;
        let tmp = tmp_path(dest);

        let res = write_then_rename(&tmp, dest, &bytes);
        if res.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        res.map_err(|cause| ExportError::DestinationWriteError {
            path: dest.to_path_buf(),
            cause,
        })
    }
}

// pid в имени: параллельные запуски и чужой <dest>.tmp рядом не затираются
fn tmp_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_owned();
    s.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(s)
}

fn write_then_rename(tmp: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);
    fs::rename(tmp, dest)
}

// -------------------- reading a document back --------------------

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: Box<RawValue>,
}

struct Collections(Vec<(String, Vec<RawEntry>)>);

impl<'de> Deserialize<'de> for Collections {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Collections;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of collection name to entry list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Collections, A::Error> {
                let mut out = Vec::new();
                while let Some((name, entries)) = map.next_entry::<String, Vec<RawEntry>>()? {
                    out.push((name, entries));
                }
                Ok(Collections(out))
            }
        }

        d.deserialize_map(OrderedVisitor)
    }
}

/// Parse a written document back into collections of raw entries, keeping the
/// document order. Values are decoded with `encoding` to the original bytes.
pub fn decode_document(bytes: &[u8], encoding: ValueEncoding) -> Result<Vec<(String, Vec<Entry>)>> {
    let Collections(cols) = serde_json::from_slice::<Collections>(bytes).context("parse export document")?;
    cols.into_iter()
        .map(|(name, raw)| -> Result<(String, Vec<Entry>)> {
            let entries = raw
                .into_iter()
                .map(|e| -> Result<Entry> {
                    let value = encoding
                        .decode(&e.value)
                        .with_context(|| format!("{}/{}", name, e.key))?;
                    Ok(Entry { key: e.key, value })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((name, entries))
        })
        .collect()
}
