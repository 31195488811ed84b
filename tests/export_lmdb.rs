// tests/export_lmdb.rs
//
// Запуск только этого файла:
//   cargo test --test export_lmdb -- --nocapture
//
// Покрываем end-to-end на настоящем LMDB-окружении:
// 1) endpoints есть, stacks нет -> документ только с endpoints, stacks в failures.
// 2) store не существует -> StoreUnavailable, файл назначения не создан.
// 3) каталог назначения не существует -> DestinationWriteError, файла нет.
// 4) пустая коллекция -> пустой список, а не отсутствующий ключ.
// 5) store как одиночный файл (NO_SUB_DIR).
// 6) бинарные значения в режиме base64 восстанавливаются байт-в-байт.
// 7) bolt-файл отвергается как StoreUnavailable с понятной причиной.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use heed::types::Bytes;
use heed::{EnvFlags, EnvOpenOptions};

use snapdump::{decode_document, export, CollectionError, ExportConfig, ExportError, ValueEncoding};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("snapdump-e2e-{prefix}-{pid}-{t}-{id}"))
}

type Fixture<'a> = &'a [(&'a str, &'a [(&'a [u8], &'a [u8])])];

/// Создать окружение и заполнить коллекции, затем полностью закрыть его.
fn create_store(path: &Path, single_file: bool, collections: Fixture<'_>) -> Result<()> {
    let mut opts = EnvOpenOptions::new();
    opts.map_size(16 * 1024 * 1024).max_dbs(16);
    let env = unsafe {
        if single_file {
            opts.flags(EnvFlags::NO_SUB_DIR);
        }
        opts.open(path)?
    };

    let mut wtxn = env.write_txn()?;
    for &(name, entries) in collections.iter() {
        let db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(name))?;
        for &(k, v) in entries.iter() {
            db.put(&mut wtxn, k, v)?;
        }
    }
    wtxn.commit()?;

    env.prepare_for_closing().wait();
    Ok(())
}

fn new_store_dir(prefix: &str, collections: Fixture<'_>) -> Result<PathBuf> {
    let root = unique_root(prefix);
    fs::create_dir_all(&root)?;
    create_store(&root, false, collections)?;
    Ok(root)
}

#[test]
fn endpoints_exported_and_missing_stacks_reported() -> Result<()> {
    let root = new_store_dir(
        "partial",
        &[(
            "endpoints",
            &[(b"1", br#"{"Name":"a"}"#), (b"2", br#"{"Name":"b"}"#)],
        )],
    )?;
    let out = root.join("data.json");
    let cfg = ExportConfig::default()
        .with_store_path(&root)
        .with_collections(["endpoints", "stacks"])
        .with_out_path(&out);

    let report = export(&cfg)?;
    assert!(!report.is_complete());
    assert_eq!(report.exported, vec![("endpoints".to_string(), 2)]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(&report.failures[0], CollectionError::NotFound(n) if n == "stacks"));

    let text = fs::read_to_string(&out)?;
    let expected = "{\n  \"endpoints\": [\n    {\n      \"Key\": \"1\",\n      \"Value\": {\"Name\":\"a\"}\n    },\n    {\n      \"Key\": \"2\",\n      \"Value\": {\"Name\":\"b\"}\n    }\n  ]\n}\n";
    assert_eq!(text, expected);

    // Value парсится как структура, а не как строка
    let v: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(v["endpoints"][1]["Value"]["Name"], "b");
    assert!(v.get("stacks").is_none());
    Ok(())
}

#[test]
fn missing_store_is_fatal_and_writes_nothing() -> Result<()> {
    let root = unique_root("missing");
    fs::create_dir_all(&root)?;
    let out = root.join("out.json");
    let cfg = ExportConfig::default()
        .with_store_path(root.join("nope.db"))
        .with_out_path(&out);

    let err = export(&cfg).unwrap_err();
    assert!(matches!(err, ExportError::StoreUnavailable { .. }), "got {err:?}");
    assert!(err.to_string().contains("nope.db"));
    assert!(!out.exists(), "no artifact must be created");
    Ok(())
}

#[test]
fn missing_destination_dir_is_fatal_and_leaves_no_file() -> Result<()> {
    let root = new_store_dir("nodest", &[("endpoints", &[(b"1", b"true")])])?;
    let out = root.join("no-such-dir").join("out.json");
    let cfg = ExportConfig::default()
        .with_store_path(&root)
        .with_collections(["endpoints"])
        .with_out_path(&out);

    let err = export(&cfg).unwrap_err();
    assert!(matches!(err, ExportError::DestinationWriteError { .. }), "got {err:?}");
    assert!(!out.exists());
    assert!(!root.join("no-such-dir").exists(), "parent dirs must not be created");
    Ok(())
}

#[test]
fn empty_collection_is_an_empty_list() -> Result<()> {
    let root = new_store_dir(
        "empty",
        &[("endpoints", &[(b"1", b"{}")]), ("stacks", &[])],
    )?;
    let out = root.join("out.json");
    let cfg = ExportConfig::default()
        .with_store_path(&root)
        .with_collections(["stacks", "endpoints"])
        .with_out_path(&out);

    let report = export(&cfg)?;
    assert!(report.is_complete());
    assert_eq!(
        report.exported,
        vec![("stacks".to_string(), 0), ("endpoints".to_string(), 1)]
    );

    let v: serde_json::Value = serde_json::from_slice(&fs::read(&out)?)?;
    assert_eq!(v["stacks"], serde_json::json!([]));
    Ok(())
}

#[test]
fn single_file_store_is_supported() -> Result<()> {
    let root = unique_root("file");
    fs::create_dir_all(&root)?;
    let db_file = root.join("data.mdb");
    create_store(&db_file, true, &[("endpoints", &[(b"7", b"\"seven\"")])])?;
    assert!(db_file.is_file());

    let out = root.join("out.json");
    let cfg = ExportConfig::default()
        .with_store_path(&db_file)
        .with_collections(["endpoints"])
        .with_out_path(&out);
    let report = export(&cfg)?;
    assert!(report.is_complete());

    let back = decode_document(&fs::read(&out)?, ValueEncoding::Json)?;
    assert_eq!(back[0].1[0].key, "7");
    assert_eq!(back[0].1[0].value, b"\"seven\"");
    Ok(())
}

#[test]
fn binary_values_round_trip_in_base64_mode() -> Result<()> {
    let blob: Vec<u8> = (0u8..=255).rev().collect();
    let root = new_store_dir(
        "b64",
        &[("blobs", &[(b"a", &blob), (b"b", b""), (b"c", b"not json")])],
    )?;
    let out = root.join("out.json");

    // json-режим: коллекция с не-JSON значением отбрасывается целиком
    let cfg = ExportConfig::default()
        .with_store_path(&root)
        .with_collections(["blobs"])
        .with_out_path(&out);
    let report = export(&cfg)?;
    assert!(report.exported.is_empty());
    assert!(matches!(&report.failures[0], CollectionError::Unencodable { .. }));

    // base64-режим: всё проходит и восстанавливается
    let cfg = cfg.with_value_encoding(ValueEncoding::Base64);
    let report = export(&cfg)?;
    assert!(report.is_complete());
    let back = decode_document(&fs::read(&out)?, ValueEncoding::Base64)?;
    let values: Vec<&[u8]> = back[0].1.iter().map(|e| e.value.as_slice()).collect();
    assert_eq!(values, vec![blob.as_slice(), b"".as_slice(), b"not json".as_slice()]);
    Ok(())
}

#[test]
fn bolt_file_is_unavailable_not_misread() -> Result<()> {
    let root = unique_root("bolt");
    fs::create_dir_all(&root)?;
    let db_file = root.join("app.db");
    // первая meta-страница bolt: 16 байт заголовка, затем magic 0xED0CDAED (LE)
    let mut page = vec![0u8; 4096];
    page[16..20].copy_from_slice(&0xED0C_DAEDu32.to_le_bytes());
    fs::write(&db_file, &page)?;

    let out = root.join("out.json");
    let cfg = ExportConfig::default()
        .with_store_path(&db_file)
        .with_collections(["endpoints"])
        .with_out_path(&out);

    let err = export(&cfg).unwrap_err();
    assert!(matches!(err, ExportError::StoreUnavailable { .. }), "got {err:?}");
    let chain = format!("{:#}", anyhow::Error::from(err));
    assert!(chain.contains("bolt"), "{chain}");
    assert!(!out.exists());
    Ok(())
}
