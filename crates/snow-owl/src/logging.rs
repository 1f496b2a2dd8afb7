//! Logging initialization
//!
//! NIST 800-53: AU-2 (Audit Events), AU-9 (Protection of Audit Information), AU-12 (Audit Generation)
//! STIG: V-222648 (Audit Records)
//! Implementation: Text or JSON output to stderr or a daily rolling file

use crate::config::{LogFormat, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. When a log file
/// is configured but unusable, logging falls back to stderr.
///
/// # Returns
///
/// The appender guard for file logging; it must be held until exit so
/// buffered records are flushed.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    if let Some((directory, file_name)) = config.file.as_deref().and_then(split_log_path) {
        match std::fs::create_dir_all(directory) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(directory, file_name);
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                match config.format {
                    LogFormat::Json => {
                        tracing_subscriber::fmt()
                            .json()
                            .with_env_filter(filter())
                            .with_writer(non_blocking)
                            .with_current_span(true)
                            .with_span_list(true)
                            .init();
                    }
                    LogFormat::Text => {
                        tracing_subscriber::fmt()
                            .with_env_filter(filter())
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .init();
                    }
                }
                return Some(guard);
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log directory: {}", e);
                eprintln!("Falling back to stderr logging");
            }
        }
    }

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }
    None
}

fn split_log_path(path: &std::path::Path) -> Option<(&std::path::Path, String)> {
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => std::path::Path::new("."),
    };
    Some((directory, file_name))
}
