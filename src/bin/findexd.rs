//! findexd - the indexing daemon.
//!
//! Opens the index database, resumes persisted roots, registers any roots
//! listed in the config file, and keeps scanning/watching until the
//! process is terminated. The HTTP and admin wire surfaces are separate
//! collaborators; this binary only hosts the core.
//!
//! Logs go to a daily-rotating file under `<data_dir>/logs`, falling back
//! to stderr when that directory can't be created. `RUST_LOG` overrides
//! the default `info` filter.

use std::sync::Arc;

use findex::config::Config;
use findex::coordinator::{Coordinator, CoordinatorOptions};
use findex::store::Store;

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("findexd: {e}");
            std::process::exit(2);
        }
    };

    let _log_guard = init_logging(&config);

    tracing::info!("findexd v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&config) {
        tracing::error!("findexd failed: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> findex::Result<()> {
    let db_path = config.db_path();
    let store = Arc::new(Store::open(&db_path)?);
    tracing::info!("Index database opened: {:?}", db_path);

    let coordinator = Coordinator::new(store, CoordinatorOptions::from(config))?;

    for pattern in &config.general.extra_ignores {
        if let Err(e) = coordinator.add_ignore(pattern) {
            tracing::warn!("Skipping config ignore pattern {:?}: {}", pattern, e);
        }
    }

    coordinator.resume_persisted_roots()?;

    for path in &config.general.watch_paths {
        match coordinator.add_root(path) {
            Ok(()) => tracing::info!("Registered root {}", path.display()),
            Err(findex::FindexError::InvalidInput(reason)) => {
                // Typically already registered from a previous run
                tracing::debug!("Root {} not added: {}", path.display(), reason);
            }
            Err(e) => tracing::warn!("Failed to register root {}: {}", path.display(), e),
        }
    }

    tracing::info!("findexd running");

    // The coordinator's threads do all the work; this thread just keeps
    // the process alive until the supervisor terminates it.
    loop {
        std::thread::park();
    }
}

/// Set up tracing with a daily-rotating file appender in the data dir.
/// The returned guard must stay alive for the non-blocking writer to
/// flush.
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = config.data_dir().join("logs");

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
    );

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("findexd: failed to create log directory {log_dir:?}: {e}");
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "findexd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();

    tracing::info!("Logging initialized to {:?}", log_dir);
    Some(guard)
}
