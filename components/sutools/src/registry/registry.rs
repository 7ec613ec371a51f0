//! Ordered store of registered functions.

// Local crates
use crate::{
    cli::dispatcher::Cli,
    helpers::{
        errors::Result,
        load_config::{CliConfig, LoggerConfig},
    },
    logger::manager::{LogManager, Loggers},
    registry::{
        models::{Args, FunctionRecord, Handler, Output},
        signature::{Signature, inspect},
    },
};

// External crates
use tracing::instrument;

/// Context object holding every registered function plus the (at most one)
/// log manager and CLI built from it.
///
/// Registration order is kept for help listings. Registering a name twice
/// replaces the earlier record in its original slot.
#[derive(Debug, Default)]
pub struct Registry {
    functions: Vec<FunctionRecord>,
    logs: Option<LogManager>,
    cli: Option<CliConfig>,
}

impl Registry {
    /// An empty one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, returning the handler unchanged so the
    /// caller can keep invoking it directly.
    pub fn register(&mut self, name: &str, signature: Signature, handler: Handler) -> Handler {
        let record = inspect(name, signature, handler.clone());
        self.register_record(record);
        handler
    }

    /// Register an `async` closure. It runs on its own short-lived runtime
    /// when dispatched from the CLI.
    pub fn register_async<F, Fut, R>(&mut self, name: &str, signature: Signature, f: F) -> Handler
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Output + Send + 'static,
    {
        self.register(name, signature, Handler::asynchronous(f))
    }

    /// Store an already inspected record. Last write wins.
    #[instrument(
        name = "sutools_registry::register",
        target = "registry::registry",
        level = "debug",
        skip_all,
        fields(command = %record.name)
    )]
    pub fn register_record(&mut self, record: FunctionRecord) -> &FunctionRecord {
        let index = match self.functions.iter().position(|f| f.name == record.name) {
            Some(index) => {
                tracing::debug!("Replacing previously registered function");
                self.functions[index] = record;
                index
            }
            None => {
                self.functions.push(record);
                self.functions.len() - 1
            }
        };
        &self.functions[index]
    }

    /// Record registered as `name`.
    pub fn get(&self, name: &str) -> Option<&FunctionRecord> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Registered command names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }

    /// Records in registration order.
    pub fn records(&self) -> &[FunctionRecord] {
        &self.functions
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// `true` before anything is registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Build the log manager. When `config.loggers` is unset, one logger is
    /// created per command registered *so far*; later registrations get none.
    pub fn logger(&mut self, config: LoggerConfig) -> Result<LogManager> {
        let names = match &config.loggers {
            Some(names) => names.clone(),
            None => self.names(),
        };
        let manager = LogManager::new(config, names)?;
        self.attach_logs(manager.clone());
        Ok(manager)
    }

    /// Keep `manager` so a later [`Registry::cli`] can hand it to the CLI.
    pub fn attach_logs(&mut self, manager: LogManager) {
        self.logs = Some(manager);
    }

    /// Log manager built by [`Registry::logger`], if any.
    pub fn logs(&self) -> Option<&LogManager> {
        self.logs.as_ref()
    }

    /// The named-logger map of the attached log manager.
    pub fn loggers(&self) -> Option<Loggers> {
        self.logs.as_ref().map(LogManager::loggers)
    }

    /// Synthesize the CLI from the current registry contents.
    pub fn cli(&mut self, config: CliConfig) -> Cli {
        let cli = Cli::new(&config, self.functions.clone(), self.logs.clone());
        self.cli = Some(config);
        cli
    }

    /// Configuration of the last CLI built from this registry.
    pub fn cli_config(&self) -> Option<&CliConfig> {
        self.cli.as_ref()
    }
}
