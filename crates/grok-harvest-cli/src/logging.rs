use std::env;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";
const DEFAULT_LOG_FILE: &str = "./logs/grok-harvest.log";

/// Where and how much to log, read from `TRACING_LEVEL` and `LOG_FILE_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    filter: String,
    directory: PathBuf,
    file_name: String,
}

impl LogSettings {
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("TRACING_LEVEL")
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let path = lookup("LOG_FILE_PATH")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        let (directory, file_name) = split_log_path(Path::new(&path));

        Self {
            filter,
            directory,
            file_name,
        }
    }

    fn log_file(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Split a log path into the appender's directory and file name. A bare
/// directory gets the default file name.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let default_name = || {
        Path::new(DEFAULT_LOG_FILE)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    match path.file_name() {
        Some(name) if path.extension().is_some() => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            (directory.to_path_buf(), name.to_string_lossy().into_owned())
        }
        _ => (path.to_path_buf(), default_name()),
    }
}

/// Console output on stderr plus a plain-text file log. Keep the returned guard
/// alive for the life of the process so buffered lines get flushed.
pub fn init_logger() -> WorkerGuard {
    let settings = LogSettings::from_env();
    let filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let dir_error = std::fs::create_dir_all(&settings.directory).err();
    let file_appender = tracing_appender::rolling::never(&settings.directory, &settings.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .without_time();
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    if let Some(err) = dir_error {
        warn!(
            "Could not create log directory {}: {}",
            settings.directory.display(),
            err
        );
    }
    info!(
        "Logging at '{}' to {}",
        settings.filter,
        settings.log_file().display()
    );

    guard
}
