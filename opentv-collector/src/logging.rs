//! Console and daily-rolling file logging.
//!
//! The library logs through the `log` facade; those records are bridged into
//! the tracing subscriber installed here.

use std::fs;
use std::io;
use std::path::Path;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_NAME: &str = "opentv-collector.log";

/// Initialize console and file output.
///
/// # Arguments
/// * `log_dir` - Directory where log files will be stored
/// * `retention_days` - Number of days to keep log files
/// * `verbose` - Use `debug`, overriding `level`
/// * `level` - Filter directive from the configuration file
///
/// `RUST_LOG` takes precedence over both.
pub fn init_logging(
    log_dir: &Path,
    retention_days: u64,
    verbose: bool,
    level: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(log_dir)?;
    clean_old_logs(log_dir, retention_days)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // The writer flushes until the guard drops; keep it for the process lifetime
    Box::leak(Box::new(guard));

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(level, verbose)));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true)
                .with_thread_ids(false)
                .with_timer(LocalTimeTimer),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_timer(LocalTimeTimer),
        );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set default subscriber: {}", e))?;
    tracing_log::LogTracer::init().map_err(|e| format!("Failed to initialize LogTracer: {}", e))?;

    Ok(())
}

/// Filter directive used when `RUST_LOG` is unset. The command-line flag
/// wins over the configuration file.
fn default_level(level: Option<&str>, verbose: bool) -> &str {
    match (level, verbose) {
        (_, true) => "debug",
        (Some(level), false) => level,
        (None, false) => "info",
    }
}

/// Delete collector log files older than `retention_days`.
fn clean_old_logs(log_dir: &Path, retention_days: u64) -> io::Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let cutoff = Local::now() - chrono::Duration::days(retention_days as i64);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.contains(LOG_FILE_NAME));
        if !path.is_file() || !is_ours {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => chrono::DateTime::<Local>::from(modified),
            Err(_) => continue,
        };
        if modified < cutoff {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("Failed to remove old log file {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}

/// Local time with microseconds.
#[derive(Debug, Clone, Copy)]
struct LocalTimeTimer;

impl fmt::time::FormatTime for LocalTimeTimer {
    fn format_time(&self, w: &mut fmt::format::Writer) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}
