//! Structured logging setup and log retention.
//!
//! Console output plus an optional daily rolling file. Traffic between host
//! and register is logged at `debug` by the transport layer, so running with
//! `RUST_LOG=kkt_link=debug` shows every frame as hex.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum number of rolled log files kept on disk.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the rolling appender.
pub const LOG_FILE_PREFIX: &str = "kkt";

const DEFAULT_FILTER: &str = "info,kkt_link=debug";

/// Default log directory for the platform.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("kkt-link").join("logs")
}

/// Install the global subscriber.
///
/// With `log_dir` set, old files are pruned and a daily rolling file layer is
/// added; the returned guard must be kept alive, dropping it flushes the
/// file writer. Fails if a global subscriber is already installed.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            prune_old_logs(dir);
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create log dir {}: {e}", dir.display()))?;

            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| format!("Failed to install subscriber: {e}"))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()
                .map_err(|e| format!("Failed to install subscriber: {e}"))?;
            Ok(None)
        }
    }
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")))
                .unwrap_or(false);
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_log_dir_is_stable() {
        let d1 = default_log_dir();
        let d2 = default_log_dir();
        assert_eq!(d1, d2);
        assert!(d1.to_string_lossy().contains("kkt-link"));
    }

    #[test]
    fn test_prune_keeps_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_LOG_FILES + 3) {
            fs::write(dir.path().join(format!("kkt.2026-01-{:02}", i + 1)), b"x").unwrap();
        }
        fs::write(dir.path().join("other.log"), b"x").unwrap();

        prune_old_logs(dir.path());

        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("kkt."))
            .collect();
        assert_eq!(remaining.len(), MAX_LOG_FILES);
        assert!(dir.path().join("other.log").exists());
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        prune_old_logs(Path::new("/definitely/not/a/kkt/log/dir"));
    }

    #[test]
    #[serial]
    fn test_init_logging_only_once() {
        let dir = tempfile::tempdir().unwrap();
        // Another test binary thread may already own the global subscriber;
        // either way a second install must fail cleanly.
        let _first = init_logging(Some(dir.path()));
        assert!(init_logging(None).is_err());
    }
}
