use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

pub type FileFmtLayer =
    fmt::Layer<tracing_subscriber::Registry, fmt::format::DefaultFields, fmt::format::Format, BoxMakeWriter>;

pub type LogReloadHandle = reload::Handle<FileFmtLayer, tracing_subscriber::Registry>;

const DEFAULT_LOG_FILTER: &str = "info";
pub const ENV_VAR_LOG_FILE: &str = "WANWATCH_LOG_FILE";

/// Creates a [`FileFmtLayer`] appending to `log_path`.
///
/// Also used to reopen the file after an external tool rotated it.
pub fn make_file_fmt_layer(log_path: &Path) -> io::Result<FileFmtLayer> {
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    Ok(fmt::layer().with_writer(BoxMakeWriter::new(file)).with_ansi(false))
}

/// Initializes the global subscriber with a reloadable file layer.
///
/// Verbosity comes from `RUST_LOG` and defaults to `info`. The returned
/// handle swaps the file layer at runtime, see [`reopen_log_file`].
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn setup_log_file(log_path: &Path) -> io::Result<LogReloadHandle> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (reload_layer, reload_handle): (
        reload::Layer<FileFmtLayer, tracing_subscriber::Registry>,
        LogReloadHandle,
    ) = reload::Layer::new(make_file_fmt_layer(log_path)?);
    tracing_subscriber::registry().with(reload_layer).with(filter).init();
    tracing::debug!("logging initialized with file output: {}", log_path.display());
    Ok(reload_handle)
}

/// Points the file layer at a freshly opened `log_path`.
pub fn reopen_log_file(handle: &LogReloadHandle, log_path: &Path) -> io::Result<()> {
    let layer = make_file_fmt_layer(log_path)?;
    handle
        .reload(layer)
        .map_err(|e| io::Error::other(format!("failed to swap log layer: {e}")))
}

/// Initializes the global subscriber writing to stdout.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn setup_stdout() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(filter)
        .init();
    tracing::debug!("logging initialized with stdout/stderr output");
}
