use std::path::Path;

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const ERROR_LOG: &str = "error.log";

/// Installs the global subscriber: filtered stdout output plus every ERROR
/// event appended to `<dir>/error.log`, rotated by size.
///
/// The returned guard flushes the error log on drop; hold it for the life of
/// the process.
pub fn init(config: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let error_file = error_log_writer(
        &config.directory,
        config.error_log_max_bytes,
        config.error_log_max_files,
    )?;
    let (error_writer, guard) = tracing_appender::non_blocking(error_file);

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(error_writer)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()?;

    Ok(guard)
}

/// `<dir>/error.log`, moved aside to `error.log.<timestamp>` once it passes
/// `max_bytes`. At most `max_files` rotated files are kept.
fn error_log_writer(
    directory: &Path,
    max_bytes: u64,
    max_files: usize,
) -> std::io::Result<FileRotate<AppendTimestamp>> {
    std::fs::create_dir_all(directory)?;
    let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);

    Ok(FileRotate::new(
        directory.join(ERROR_LOG),
        AppendTimestamp::default(FileLimit::MaxFiles(max_files)),
        ContentLimit::BytesSurpassed(limit),
        Compression::None,
        None,
    ))
}
