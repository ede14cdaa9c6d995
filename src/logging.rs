//! Logging setup for snowsample.
//!
//! Stdout carries the sample tables and JSON, so logs never go there. They go
//! to stderr unless `--log-file` names a file (or asks for the default one
//! under the platform state directory).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "snowsample.log";

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber and returns the target actually in use.
///
/// A log file that cannot be opened downgrades to stderr with a warning; a
/// run is never aborted over logging.
pub fn init(target: LogTarget) -> LogTarget {
    let path = match target {
        LogTarget::Stderr => {
            init_stderr();
            return LogTarget::Stderr;
        }
        LogTarget::File(path) => path,
    };

    match open_log_file(&path) {
        Ok(file) => {
            // Ignored: a subscriber may already be installed (tests).
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init();
            LogTarget::File(path)
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not open log file {}: {e}; logging to stderr",
                path.display()
            );
            init_stderr();
            LogTarget::Stderr
        }
    }
}

fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .try_init();
}

/// Creates the parent directories and truncates the file.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// `~/.local/state/snowsample/snowsample.log` on Linux; the config or temp
/// directory where there is no state directory.
pub fn default_log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::config_dir)
        .map(|dir| dir.join("snowsample").join(LOG_FILE_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE_NAME))
}
