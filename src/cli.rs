use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ExportConfig;
use crate::document::ValueEncoding;
use crate::export::export;
use crate::session::{close, open, with_snapshot};
use crate::store::SnapshotView;

/// Без подкоманды работает как `export` с настройками из окружения.
#[derive(Parser, Debug)]
#[command(
    name = "snapdump",
    version,
    about = "Consistent JSON export of named collections from an LMDB store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Export collections from one snapshot into a JSON document
    ///
    /// Пример:
    ///   snapdump export --store ./store -c endpoints -c stacks --out ./dump.json
    Export {
        /// LMDB environment directory or data file (env SNAPDUMP_STORE)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Collection to export; repeat or comma-separate (env SNAPDUMP_COLLECTIONS)
        #[arg(long = "collection", short = 'c', value_delimiter = ',')]
        collections: Vec<String>,
        /// Destination file; its directory must exist (env SNAPDUMP_OUT)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Value embedding: json (verbatim) or base64 (env SNAPDUMP_VALUES)
        #[arg(long)]
        values: Option<ValueEncoding>,
        /// LMDB max_dbs for this run (env SNAPDUMP_MAX_COLLECTIONS)
        #[arg(long)]
        max_collections: Option<u32>,
    },
    /// List collections of one snapshot with entry counts
    List {
        #[arg(long)]
        store: Option<PathBuf>,
        /// JSON output (single array)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Фатальная ошибка: store недоступен, документ не записан, неверные аргументы.
pub const EXIT_FATAL: i32 = 1;
/// Документ записан, но часть коллекций пропущена.
pub const EXIT_PARTIAL: i32 = 2;

/// Exit status of a run that did not fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Document written, some requested collections skipped.
    Partial,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Complete => 0,
            Outcome::Partial => EXIT_PARTIAL,
        }
    }
}

/// Parse the process arguments and run.
///
/// clap сам завершает процесс с кодом 2 на ошибке разбора, а 2 у нас занят
/// частичным экспортом. Поэтому разбираем через try_parse: help/version печатаются
/// как обычно (код 0), любая ошибка аргументов уходит с EXIT_FATAL.
pub fn run() -> Result<Outcome> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_FATAL);
        }
    };
    run_with(cli)
}

pub fn run_with(cli: Cli) -> Result<Outcome> {
    let cfg = ExportConfig::from_env();
    match cli.cmd {
        None => cmd_export(cfg),
        Some(Cmd::Export {
            store,
            collections,
            out,
            values,
            max_collections,
        }) => {
            let mut cfg = cfg;
            if let Some(p) = store {
                cfg = cfg.with_store_path(p);
            }
            if !collections.is_empty() {
                cfg = cfg.with_collections(collections);
            }
            if let Some(p) = out {
                cfg = cfg.with_out_path(p);
            }
            if let Some(v) = values {
                cfg = cfg.with_value_encoding(v);
            }
            if let Some(n) = max_collections {
                cfg = cfg.with_max_collections(n);
            }
            cmd_export(cfg)
        }
        Some(Cmd::List { store, json }) => {
            let cfg = match store {
                Some(p) => cfg.with_store_path(p),
                None => cfg,
            };
            cmd_list(&cfg, json)?;
            Ok(Outcome::Complete)
        }
    }
}

fn cmd_export(cfg: ExportConfig) -> Result<Outcome> {
    log::debug!("{}", cfg);
    if cfg.collections.is_empty() {
        return Err(anyhow!(
            "no collections requested (use --collection or SNAPDUMP_COLLECTIONS)"
        ));
    }

    let report = export(&cfg)?;
    println!("JSON data written to {}", report.destination.display());

    if report.is_complete() {
        Ok(Outcome::Complete)
    } else {
        Ok(Outcome::Partial)
    }
}

fn cmd_list(cfg: &ExportConfig, json: bool) -> Result<()> {
    let store = open(&cfg.store_path, cfg)?;
    let listing = with_snapshot(&store, |snap| -> Result<Vec<(String, Result<usize>)>> {
        let names = snap.collection_names()?;
        Ok(names
            .into_iter()
            .map(|n| {
                let count = count_entries(snap, &n);
                (n, count)
            })
            .collect())
    })??;
    close(store);

    if json {
        let arr: Vec<serde_json::Value> = listing
            .iter()
            .map(|(name, count)| match count {
                Ok(n) => serde_json::json!({ "name": name, "entries": n }),
                Err(e) => serde_json::json!({ "name": name, "error": format!("{:#}", e) }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&arr)?);
    } else if listing.is_empty() {
        println!("(no collections)");
    } else {
        for (name, count) in &listing {
            match count {
                Ok(n) => println!("{:<32} {} entries", name, n),
                Err(e) => println!("{:<32} error: {:#}", name, e),
            }
        }
    }
    Ok(())
}

fn count_entries(snap: &dyn SnapshotView, name: &str) -> Result<usize> {
    snap.scan_collection(name, &mut |_, _| Ok(()))?
        .ok_or_else(|| anyhow!("collection {} vanished", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn export_flags_parse() {
        let cli = Cli::try_parse_from([
            "snapdump", "export", "--store", "/s", "-c", "a,b", "-c", "c", "--values", "base64",
        ])
        .expect("valid args");
        match cli.cmd {
            Some(Cmd::Export { store, collections, values, .. }) => {
                assert_eq!(store, Some(PathBuf::from("/s")));
                assert_eq!(collections, vec!["a", "b", "c"]);
                assert_eq!(values, Some(ValueEncoding::Base64));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn usage_errors_are_not_confused_with_partial_export() {
        let err = Cli::try_parse_from(["snapdump", "export", "--no-such-flag"]).unwrap_err();
        assert!(err.use_stderr());
        // clap по умолчанию вышел бы с тем же кодом, что и частичный экспорт
        assert_eq!(err.exit_code(), EXIT_PARTIAL);
        assert_ne!(EXIT_FATAL, EXIT_PARTIAL);

        let help = Cli::try_parse_from(["snapdump", "--help"]).unwrap_err();
        assert!(!help.use_stderr());
        assert_eq!(Outcome::Partial.exit_code(), EXIT_PARTIAL);
        assert_eq!(Outcome::Complete.exit_code(), 0);
    }

    #[test]
    fn no_subcommand_means_default_export() {
        let cli = Cli::try_parse_from(["snapdump"]).expect("valid args");
        assert!(cli.cmd.is_none());
    }
}
