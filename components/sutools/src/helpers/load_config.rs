//! Logger and CLI configuration, with TOML loading.

// Local crates
use crate::{
    helpers::errors::{Result as SutoolsResult, SutoolsError},
    logger::format::LogFormat,
};

// External crates
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, de::DeserializeOwned};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;
use tracing_subscriber::filter::LevelFilter;

/// Root directory used when no `filepath` is configured.
pub const DEFAULT_LOG_ROOT: &str = "logs";

/// `strftime` layout of the default log file name.
pub const DEFAULT_FILENAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Log file open mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Every run starts a fresh file.
    #[default]
    Truncate,
    /// Keep earlier content and add to it.
    Append,
}

/// Where the stream sink writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
}

/// Options accepted when constructing the named loggers.
///
/// Every field has a default, so both a partial TOML file and
/// `LoggerConfig { stream: true, ..Default::default() }` work.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Module directory under the log root. Defaults to the program name.
    pub name: Option<String>,
    /// Explicit logger names. Defaults to the registered command names.
    pub loggers: Option<Vec<String>>,
    /// Level name: `trace`, `debug`, `info`, `warn`, `error` or `off`.
    pub level: String,
    /// File stem of the log file. Defaults to the current local timestamp.
    pub filename: Option<String>,
    /// Log root directory. Defaults to [`DEFAULT_LOG_ROOT`].
    pub filepath: Option<PathBuf>,
    /// Write a log file under `<filepath>/<name>/`.
    pub file: bool,
    /// Truncate or append an existing file.
    pub file_mode: FileMode,
    /// Line format of the file sink.
    pub file_format: LogFormat,
    /// Also write to a standard stream.
    pub stream: bool,
    /// Which standard stream the stream sink writes to.
    pub stream_target: StreamTarget,
    /// Line format of the stream sink.
    pub stream_format: LogFormat,
    /// Keep at most this many `.log` files in the module directory.
    pub filecap: Option<usize>,
    /// Delete `.log` files older than this window, e.g. `30m`, `12h`, `1y`.
    pub filetimeout: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            name: None,
            loggers: None,
            level: "info".to_string(),
            filename: None,
            filepath: None,
            file: true,
            file_mode: FileMode::default(),
            file_format: LogFormat::default(),
            stream: false,
            stream_target: StreamTarget::default(),
            stream_format: LogFormat::default(),
            filecap: None,
            filetimeout: None,
        }
    }
}

impl LoggerConfig {
    /// Load and parse a TOML logger configuration file.
    #[instrument(
        name = "sutools_config::load_logger",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_toml(path.as_ref())
    }

    /// Parsed [`LoggerConfig::level`].
    pub fn level_filter(&self) -> SutoolsResult<LevelFilter> {
        LevelFilter::from_str(self.level.trim())
            .map_err(|_| SutoolsError::Config(format!("unknown log level `{}`", self.level)))
    }

    /// Module directory name, falling back to the program name.
    pub fn module_name(&self) -> String {
        self.name.clone().unwrap_or_else(program_name)
    }

    /// `<root>/<module>/<filename>.log`
    pub fn log_path(&self) -> PathBuf {
        let root = self
            .filepath
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_ROOT));
        let filename = self
            .filename
            .clone()
            .unwrap_or_else(|| Local::now().format(DEFAULT_FILENAME_FORMAT).to_string());
        root.join(self.module_name()).join(format!("{filename}.log"))
    }
}

/// Options accepted when constructing the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Top-level help description.
    pub description: Option<String>,
    /// Keep named loggers enabled while a command runs from the CLI.
    pub logs: bool,
    /// Program name shown in usage. Defaults to the executable's file stem.
    pub program: Option<String>,
}

impl CliConfig {
    /// CLI with the given description and logs disabled.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// Keep named loggers active while commands run.
    pub fn with_logs(mut self, logs: bool) -> Self {
        self.logs = logs;
        self
    }

    /// Load and parse a TOML CLI configuration file.
    #[instrument(
        name = "sutools_config::load_cli",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_toml(path.as_ref())
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    tracing::trace!(configuration_file_path = %path.display(), "Loading sutools configuration file");

    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read configuration file");
            return Err(e).with_context(|| format!("Failed to read config file at {:?}", path));
        }
    };
    let config: T = match toml::from_str(&config_str) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse TOML configuration");
            return Err(e).with_context(|| format!("Failed to parse TOML from {:?}", path));
        }
    };

    tracing::trace!(configuration_file_path = %path.display(), "sutools configuration file loaded successfully");
    Ok(config)
}

/// Base name of the running executable without its extension.
pub fn program_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
