//! Named loggers and the manager owning their sinks.

// Local crates
use crate::{
    helpers::{
        errors::{Result, SutoolsError},
        load_config::{FileMode, LoggerConfig, StreamTarget},
    },
    logger::{
        cleanup::{CleanupReport, remove_empty_artifacts},
        format::LogFormat,
        retention::{self, CapReport},
    },
};

// External crates
use chrono::Utc;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{Dispatch, Level, instrument};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter::LevelFilter, fmt as tracing_fmt, layer::SubscriberExt, registry::Registry, reload,
};

macro_rules! event_at {
    ($level:expr, $($arg:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($arg)*),
            Level::WARN => tracing::warn!($($arg)*),
            Level::INFO => tracing::info!($($arg)*),
            Level::DEBUG => tracing::debug!($($arg)*),
            _ => tracing::trace!($($arg)*),
        }
    };
}

/// Lifecycle of a [`LogManager`]. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No sink attached; named loggers forward to the host's subscriber.
    Unattached,
    /// File and/or stream sinks bound.
    Attached,
    /// Retention policies applied.
    Evaluated,
    /// Sinks detached and empty artifacts removed.
    Closed,
}

enum Route {
    /// Forward to whatever subscriber is current, tagged with the logger name.
    Propagate,
    /// Isolated dispatcher owning this logger's sinks.
    Isolated {
        dispatch: Dispatch,
        level: reload::Handle<LevelFilter, Registry>,
    },
    Closed,
}

struct LoggerInner {
    name: String,
    configured: LevelFilter,
    level: RwLock<LevelFilter>,
    route: RwLock<Route>,
}

/// A logger identified by name, usually matching a registered command.
///
/// Clones share state: muting or closing one clone affects all of them.
#[derive(Clone)]
pub struct NamedLogger {
    inner: Arc<LoggerInner>,
}

/// Writers shared by every named logger of one manager.
#[derive(Clone, Default)]
struct Sinks {
    file: Option<(NonBlocking, LogFormat)>,
    stream: Option<(NonBlocking, LogFormat)>,
}

impl NamedLogger {
    fn new(name: &str, level: LevelFilter, sinks: &Sinks) -> Self {
        let route = if sinks.file.is_none() && sinks.stream.is_none() {
            Route::Propagate
        } else {
            let (level_layer, level_handle) = reload::Layer::new(level);
            let file_layer = sinks.file.clone().map(|(writer, format)| {
                tracing_fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .event_format(format.for_logger(name))
            });
            let stream_layer = sinks.stream.clone().map(|(writer, format)| {
                tracing_fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .event_format(format.for_logger(name))
            });
            let subscriber = Registry::default()
                .with(level_layer)
                .with(file_layer)
                .with(stream_layer);

            Route::Isolated {
                dispatch: Dispatch::new(subscriber),
                level: level_handle,
            }
        };

        Self {
            inner: Arc::new(LoggerInner {
                name: name.to_string(),
                configured: level,
                level: RwLock::new(level),
                route: RwLock::new(route),
            }),
        }
    }

    /// A logger with no sinks that drops everything. Returned for names the
    /// manager does not know about.
    pub fn disabled(name: &str) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                name: name.to_string(),
                configured: LevelFilter::OFF,
                level: RwLock::new(LevelFilter::OFF),
                route: RwLock::new(Route::Closed),
            }),
        }
    }

    /// Logger name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current level; `OFF` while muted.
    pub fn level(&self) -> LevelFilter {
        *self.inner.level.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the level of this logger and all its clones.
    pub fn set_level(&self, level: LevelFilter) {
        *self.inner.level.write().unwrap_or_else(PoisonError::into_inner) = level;

        let route = self.inner.route.read().unwrap_or_else(PoisonError::into_inner);
        if let Route::Isolated { level: handle, .. } = &*route {
            if let Err(e) = handle.reload(level) {
                tracing::warn!(error = %e, logger = %self.inner.name, "Failed to reload logger level");
            }
        }
    }

    /// Silence the logger until [`NamedLogger::unmute`].
    pub fn mute(&self) {
        self.set_level(LevelFilter::OFF);
    }

    /// Restore the level the logger was created with.
    pub fn unmute(&self) {
        self.set_level(self.inner.configured);
    }

    /// Whether the sinks were detached by [`LogManager::close`].
    pub fn is_closed(&self) -> bool {
        matches!(
            *self.inner.route.read().unwrap_or_else(PoisonError::into_inner),
            Route::Closed
        )
    }

    /// Emit `message` at `level` if the logger lets it through.
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        if level > self.level() {
            return;
        }

        let route = self.inner.route.read().unwrap_or_else(PoisonError::into_inner);
        match &*route {
            Route::Isolated { dispatch, .. } => {
                tracing::dispatcher::with_default(dispatch, || event_at!(level, "{}", message));
            }
            Route::Propagate => {
                event_at!(level, logger = %self.inner.name, "{}", message);
            }
            Route::Closed => {}
        }
    }

    /// Log at `TRACE`.
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Level::TRACE, message);
    }

    /// Log at `DEBUG`.
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::DEBUG, message);
    }

    /// Log at `INFO`.
    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::INFO, message);
    }

    /// Log at `WARN`.
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::WARN, message);
    }

    /// Log at `ERROR`.
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::ERROR, message);
    }

    /// Run `f` with this logger's sinks as the default subscriber, so plain
    /// `tracing::info!` calls inside it land in this logger's file/stream.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let route = self.inner.route.read().unwrap_or_else(PoisonError::into_inner);
        match &*route {
            Route::Isolated { dispatch, .. } => tracing::dispatcher::with_default(dispatch, f),
            _ => f(),
        }
    }

    /// Drop the sinks. Later calls are no-ops.
    fn detach(&self) {
        *self.inner.route.write().unwrap_or_else(PoisonError::into_inner) = Route::Closed;
    }
}

impl fmt::Debug for NamedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedLogger")
            .field("name", &self.inner.name)
            .field("level", &self.level())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Name to logger mapping, in creation order.
#[derive(Debug, Clone, Default)]
pub struct Loggers {
    entries: Vec<NamedLogger>,
}

impl Loggers {
    /// Logger called `name`, if the manager created one.
    pub fn get(&self, name: &str) -> Option<&NamedLogger> {
        self.entries.iter().find(|l| l.name() == name)
    }

    /// The logger called `name`, or a disabled one if there is none.
    pub fn named(&self, name: &str) -> NamedLogger {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| NamedLogger::disabled(name))
    }

    /// Logger names in creation order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(NamedLogger::name).collect()
    }

    /// Loggers in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &NamedLogger> {
        self.entries.iter()
    }

    /// Number of loggers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the manager created no loggers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mute every logger.
    pub fn mute_all(&self) {
        self.entries.iter().for_each(NamedLogger::mute);
    }

    /// Restore every logger to its configured level.
    pub fn unmute_all(&self) {
        self.entries.iter().for_each(NamedLogger::unmute);
    }
}

struct ManagerInner {
    name: String,
    log_path: Option<PathBuf>,
    loggers: Loggers,
    guards: Mutex<Vec<WorkerGuard>>,
    state: Mutex<LifecycleState>,
    cap_report: Option<CapReport>,
    timeout_removed: Option<usize>,
}

/// Owner of the named loggers, their sinks and the log file lifecycle.
///
/// Construction attaches the sinks and applies the retention policies once.
/// [`LogManager::close`] (or dropping an [`ExitGuard`]) detaches the sinks
/// and removes empty artifacts.
#[derive(Clone)]
pub struct LogManager {
    inner: Arc<ManagerInner>,
}

impl LogManager {
    /// Build one named logger per entry of `names`.
    pub fn new(config: LoggerConfig, names: Vec<String>) -> Result<Self> {
        Self::build(config, names, None)
    }

    /// Like [`LogManager::new`], but the stream sink writes to `writer`
    /// instead of stdout/stderr. Enables the stream sink.
    pub fn with_stream_writer<W>(mut config: LoggerConfig, names: Vec<String>, writer: W) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        config.stream = true;
        Self::build(config, names, Some(Box::new(writer)))
    }

    #[instrument(
        name = "sutools_logger::build",
        target = "logger::manager",
        level = "debug",
        skip_all,
        fields(loggers = names.len())
    )]
    fn build(
        config: LoggerConfig,
        names: Vec<String>,
        stream_writer: Option<Box<dyn Write + Send>>,
    ) -> Result<Self> {
        let level = config.level_filter()?;
        let module = config.module_name();
        let log_path = config.log_path();
        let mut guards = Vec::new();
        let mut sinks = Sinks::default();

        if config.file {
            let file = open_log_file(&log_path, config.file_mode)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            guards.push(guard);
            sinks.file = Some((writer, config.file_format.clone()));
            tracing::debug!(log_file = %log_path.display(), "Attached file sink");
        }

        if config.stream {
            let (writer, guard) = match (stream_writer, config.stream_target) {
                (Some(writer), _) => tracing_appender::non_blocking(writer),
                (None, StreamTarget::Stdout) => tracing_appender::non_blocking(std::io::stdout()),
                (None, StreamTarget::Stderr) => tracing_appender::non_blocking(std::io::stderr()),
            };
            guards.push(guard);
            sinks.stream = Some((writer, config.stream_format.clone()));
            tracing::debug!(target_stream = ?config.stream_target, "Attached stream sink");
        }

        let loggers = Loggers {
            entries: names
                .iter()
                .map(|name| NamedLogger::new(name, level, &sinks))
                .collect(),
        };

        let mut state = if guards.is_empty() {
            LifecycleState::Unattached
        } else {
            LifecycleState::Attached
        };

        let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let cap_report = match config.filecap {
            Some(max) if max > 0 => Some(apply_cap(&log_dir, max)),
            _ => None,
        };
        let timeout_removed = config
            .filetimeout
            .as_deref()
            .map(|window| apply_timeout(&log_dir, window));
        if cap_report.is_some() || timeout_removed.is_some() {
            state = LifecycleState::Evaluated;
        }

        tracing::debug!(module = %module, ?state, "Log manager ready");

        Ok(Self {
            inner: Arc::new(ManagerInner {
                name: module,
                log_path: config.file.then_some(log_path),
                loggers,
                guards: Mutex::new(guards),
                state: Mutex::new(state),
                cap_report,
                timeout_removed,
            }),
        })
    }

    /// Module name the log directory is named after.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Path of the file sink, if file logging is enabled.
    pub fn log_path(&self) -> Option<&Path> {
        self.inner.log_path.as_deref()
    }

    /// Handle on every named logger.
    pub fn loggers(&self) -> Loggers {
        self.inner.loggers.clone()
    }

    /// Logger called `name`, or a disabled one when there is none.
    pub fn logger(&self, name: &str) -> NamedLogger {
        self.inner.loggers.named(name)
    }

    /// Where the manager is in its lifecycle.
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Result of the count based retention run at construction.
    pub fn cap_report(&self) -> Option<CapReport> {
        self.inner.cap_report
    }

    /// Files removed by the age based retention run at construction.
    pub fn timeout_removed(&self) -> Option<usize> {
        self.inner.timeout_removed
    }

    /// Flush and detach every sink, then remove the log file if it is empty
    /// and its directories if they are left empty. Only the first call does
    /// anything.
    #[instrument(
        name = "sutools_logger::close",
        target = "logger::manager",
        level = "debug",
        skip_all,
        fields(module = %self.inner.name)
    )]
    pub fn close(&self) -> CleanupReport {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == LifecycleState::Closed {
                return CleanupReport::default();
            }
            *state = LifecycleState::Closed;
        }

        self.inner.loggers.iter().for_each(NamedLogger::detach);

        // dropping the guards flushes the non-blocking workers
        let guards = std::mem::take(
            &mut *self.inner.guards.lock().unwrap_or_else(PoisonError::into_inner),
        );
        drop(guards);

        match self.inner.log_path.as_deref() {
            Some(path) => remove_empty_artifacts(path),
            None => CleanupReport::default(),
        }
    }

    /// RAII handle that calls [`LogManager::close`] when dropped.
    pub fn exit_guard(&self) -> ExitGuard {
        ExitGuard {
            manager: self.clone(),
        }
    }
}

impl fmt::Debug for LogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogManager")
            .field("name", &self.inner.name)
            .field("log_path", &self.inner.log_path)
            .field("loggers", &self.inner.loggers.names())
            .field("state", &self.state())
            .finish()
    }
}

/// Closes the log manager when it goes out of scope.
#[derive(Debug)]
#[must_use = "the log manager is closed as soon as the guard is dropped"]
pub struct ExitGuard {
    manager: LogManager,
}

impl ExitGuard {
    /// Close now and hand back the cleanup report.
    pub fn release(self) -> CleanupReport {
        self.manager.close()
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.manager.close();
    }
}

fn open_log_file(path: &Path, mode: FileMode) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SutoolsError::io(parent, e))?;
    }

    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        FileMode::Truncate => options.write(true).truncate(true),
        FileMode::Append => options.append(true),
    };
    options.open(path).map_err(|e| SutoolsError::io(path, e))
}

fn apply_cap(dir: &Path, max: usize) -> CapReport {
    let files = match retention::scan_logs(dir) {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping filecap, log directory could not be scanned");
            return CapReport::default();
        }
    };

    let report = retention::cap(max, files);
    if report.removed > 0 {
        println!("{report}");
        tracing::info!(removed = report.removed, kept = report.kept, "{report}");
    }
    report
}

fn apply_timeout(dir: &Path, window: &str) -> usize {
    let files = match retention::scan_logs(dir) {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping filetimeout, log directory could not be scanned");
            return 0;
        }
    };

    match retention::timeout(window, &files, Utc::now()) {
        Ok(0) => 0,
        Ok(removed) => {
            println!("timeout removed {removed} logs");
            tracing::info!(removed, "timeout removed {removed} logs");
            removed
        }
        // already reported by `retention::timeout`
        Err(_) => 0,
    }
}
