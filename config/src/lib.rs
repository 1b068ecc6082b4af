use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, EnvFilter};

pub mod naming;
mod settings;

pub use settings::Settings;

fn env_filter(filter: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(filter.into())
        .from_env_lossy()
}

/// Installs a stdout subscriber. `RUST_LOG` overrides `filter` when set.
pub fn setup_tracing_to_stdout(filter: impl Into<LevelFilter>) -> anyhow::Result<()> {
    fmt()
        .with_env_filter(env_filter(filter.into()))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

pub fn setup_tracing_to_file(
    directory: impl AsRef<Path>,
    file_name_prefix: impl AsRef<Path>,
    filter: impl Into<LevelFilter>,
) -> anyhow::Result<non_blocking::WorkerGuard> {
    let file_appender = rolling::daily(directory, file_name_prefix);
    let (non_blocking, guard) = non_blocking(file_appender);
    fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(env_filter(filter.into()))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(guard)
}
