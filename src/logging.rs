use std::fs;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Console subscriber for the hosting process. Honors `RUST_LOG`; defaults
/// to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// File subscriber writing daily-rolled logs under `dir`. Keep the returned
/// guard alive for as long as the process logs.
pub fn init_tracing_to_dir(dir: &Path) -> std::io::Result<WorkerGuard> {
    fs::create_dir_all(dir)?;
    let file_appender = tracing_appender::rolling::daily(dir, "shiai.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("bracket engine logging to {}", dir.display());
    Ok(guard)
}
