//! Error taxonomy.

// External crates
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a retention timeout string such as `30m` or `2y` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutParseError {
    /// Nothing to parse.
    #[error("empty timeout window")]
    Empty,
    /// Unit outside `m`, `h`, `d`, `o`, `y`.
    #[error("Invalid time unit: {0}")]
    InvalidUnit(char),
    /// Amount is not an integer.
    #[error("Invalid time amount: {0:?}")]
    InvalidAmount(String),
}

/// Errors surfaced by the registry, parser synthesis, dispatch and log setup.
///
/// Errors raised by user handlers are carried untouched in [`SutoolsError::Handler`];
/// this crate never tries to recover them.
#[derive(Debug, Error)]
pub enum SutoolsError {
    /// Filesystem operation failed.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Unusable configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Retention window could not be parsed.
    #[error(transparent)]
    InvalidTimeout(#[from] TimeoutParseError),

    /// No command registered under this name.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// A declared parameter got no value.
    #[error("missing argument `{0}`")]
    MissingArgument(String),

    /// Argument accessed as a type it does not hold.
    #[error("argument `{name}` is not a {expected}")]
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Type the caller asked for.
        expected: &'static str,
    },

    /// Command line rejected by the parser.
    #[error(transparent)]
    Parse(#[from] clap::Error),

    /// Could not start the async runtime.
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Error returned by a registered function.
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl SutoolsError {
    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T, E = SutoolsError> = std::result::Result<T, E>;
