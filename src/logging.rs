//! Diagnostic logging.
//!
//! The chat view owns the terminal, so diagnostics go to a file or nowhere.
//! Logging is enabled by `--log <file>` or `PARLEY_LOG_FILE`; the filter
//! comes from `RUST_LOG` and defaults to `parley=debug`.

use std::{
    error::Error,
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::EnvFilter;

pub const LOG_FILE_VAR: &str = "PARLEY_LOG_FILE";
const DEFAULT_FILTER: &str = "parley=debug";

/// Pick the log destination: the command-line path wins over the environment.
pub fn log_path(cli: Option<PathBuf>, env: Option<String>) -> Option<PathBuf> {
    cli.or_else(|| env.filter(|value| !value.trim().is_empty()).map(PathBuf::from))
}

/// Install the global subscriber writing to `path`. Returns `false` when no
/// path is given and nothing was installed.
pub fn init(path: Option<&Path>) -> Result<bool, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(false);
    };

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|err| err as Box<dyn Error>)?;
    Ok(true)
}
