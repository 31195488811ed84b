use env_logger::{Builder, Env};
use log::error;

use snapdump::cli::{Outcome, EXIT_FATAL};

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    // Пример: RUST_LOG=debug ./snapdump export ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    match snapdump::cli::run() {
        Ok(Outcome::Complete) => {}
        // документ записан, но не все коллекции попали в него
        Ok(outcome @ Outcome::Partial) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(EXIT_FATAL);
        }
    }
}
