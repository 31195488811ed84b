//! store/lmdb — чтение LMDB-окружения через heed.
//!
//! - Коллекция = именованная БД LMDB; главная (безымянная) БД хранит их имена.
//! - Окружение открывается с READ_ONLY: ни эксклюзивных локов, ни блокировки writer'а.
//!   Изоляцию даёт MVCC read-транзакция, а не взаимное исключение.
//! - Путь может быть каталогом (data.mdb внутри) или одиночным файлом (NO_SUB_DIR).
//! - Bolt-файл (bbolt/BoltDB) узнаём по magic и отвергаем понятной ошибкой.
//! - Snapshot = RoTxn: release() делает commit, Drop без release — abort. Ровно одно из двух.

use anyhow::{anyhow, Context, Result};
use heed::types::Bytes;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn};
use log::debug;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::ExportConfig;
use crate::error::ExportError;

use super::{SnapshotView, Store, Visit};

type RawDb = Database<Bytes, Bytes>;

// bolt: заголовок страницы 16 байт, затем meta.magic (u32 LE)
const BOLT_MAGIC: u32 = 0xED0C_DAED;
const BOLT_MAGIC_OFFSET: usize = 16;

/// Read-only handle to an LMDB environment.
pub struct LmdbStore {
    env: Env,
    path: PathBuf,
}

impl LmdbStore {
    /// Open the store read-only. Any failure here is fatal for the run.
    pub fn open(path: &Path, cfg: &ExportConfig) -> Result<Self, ExportError> {
        let env = open_env_ro(path, cfg.max_collections).map_err(|cause| {
            ExportError::StoreUnavailable {
                path: path.to_path_buf(),
                cause,
            }
        })?;
        debug!("opened LMDB environment {} (read-only)", path.display());
        Ok(Self {
            env,
            path: path.to_path_buf(),
        })
    }

    /// Wrap an environment the caller already holds (e.g. the writer's own `Env`).
    /// LMDB does not allow opening one environment twice in a process.
    pub fn from_env(env: Env) -> Self {
        let path = env.path().to_path_buf();
        Self { env, path }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }
}

fn open_env_ro(path: &Path, max_dbs: u32) -> Result<Env> {
    let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;

    let mut flags = EnvFlags::READ_ONLY;
    if meta.is_file() {
        if is_bolt_file(path)? {
            return Err(anyhow!(
                "{} is a bolt (bbolt/BoltDB) file; only LMDB stores can be exported",
                path.display()
            ));
        }
        // одиночный файл вместо каталога окружения
        flags |= EnvFlags::NO_SUB_DIR;
    } else if !meta.is_dir() {
        return Err(anyhow!("{} is neither a file nor a directory", path.display()));
    }

    let mut opts = EnvOpenOptions::new();
    opts.max_dbs(max_dbs);

    // SAFETY: окружение открывается только на чтение и не отображается повторно
    // в этом процессе (для разделяемого Env есть LmdbStore::from_env).
    let env = unsafe {
        opts.flags(flags);
        opts.open(path)
    }
    .with_context(|| format!("open LMDB environment {}", path.display()))?;
    Ok(env)
}

fn is_bolt_file(path: &Path) -> Result<bool> {
    let mut head = [0u8; BOLT_MAGIC_OFFSET + 4];
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    match f.read_exact(&mut head) {
        Ok(()) => Ok(looks_like_bolt(&head)),
        // слишком короткий файл — точно не bolt, пусть разбирается LMDB
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

fn looks_like_bolt(head: &[u8]) -> bool {
    head.get(BOLT_MAGIC_OFFSET..BOLT_MAGIC_OFFSET + 4)
        .map(|m| u32::from_le_bytes([m[0], m[1], m[2], m[3]]) == BOLT_MAGIC)
        .unwrap_or(false)
}

impl Store for LmdbStore {
    type Snapshot<'s> = LmdbSnapshot<'s>;

    fn begin(&self) -> Result<LmdbSnapshot<'_>> {
        let txn = self
            .env
            .read_txn()
            .with_context(|| format!("begin read txn on {}", self.path.display()))?;
        Ok(LmdbSnapshot {
            env: &self.env,
            txn: Some(txn),
        })
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// One read transaction: a consistent view of every collection at its start.
pub struct LmdbSnapshot<'e> {
    env: &'e Env,
    // None только после release()
    txn: Option<RoTxn<'e>>,
}

impl<'e> LmdbSnapshot<'e> {
    fn txn(&self) -> Result<&RoTxn<'e>> {
        self.txn
            .as_ref()
            .ok_or_else(|| anyhow!("snapshot already released"))
    }

    fn open_collection(&self, name: &str) -> Result<Option<RawDb>> {
        self.env
            .open_database::<Bytes, Bytes>(self.txn()?, Some(name))
            .with_context(|| format!("open collection {}", name))
    }
}

impl SnapshotView for LmdbSnapshot<'_> {
    fn scan_collection(&self, name: &str, visit: &mut Visit<'_>) -> Result<Option<usize>> {
        let db = match self.open_collection(name)? {
            Some(db) => db,
            None => return Ok(None),
        };

        let mut visited = 0usize;
        let iter = db
            .iter(self.txn()?)
            .with_context(|| format!("iterate collection {}", name))?;
        for item in iter {
            let (k, v) = item.with_context(|| format!("read entry #{} of {}", visited, name))?;
            visit(k, v)?;
            visited += 1;
        }
        Ok(Some(visited))
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        let txn = self.txn()?;
        let main: RawDb = self
            .env
            .open_database(txn, None)
            .context("open main database")?
            .ok_or_else(|| anyhow!("main database is missing"))?;

        let mut names = Vec::new();
        for item in main.iter(txn).context("iterate main database")? {
            let (k, _) = item.context("read main database entry")?;
            match std::str::from_utf8(k) {
                Ok(s) => names.push(s.to_string()),
                Err(_) => debug!("skip non-UTF-8 name in main database ({} B)", k.len()),
            }
        }
        Ok(names)
    }

    /// Commit (not abort) the read txn so collection handles opened in it stay
    /// valid for other transactions sharing the environment.
    fn release(mut self) -> Result<()> {
        match self.txn.take() {
            Some(txn) => txn.commit().context("commit read txn"),
            None => Ok(()),
        }
    }
}

impl Drop for LmdbSnapshot<'_> {
    fn drop(&mut self) {
        if self.txn.take().is_some() {
            // RoTxn::drop делает abort
            debug!("aborted read txn on {}", self.env.path().display());
        }
    }
}
