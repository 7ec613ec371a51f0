//! Register plain functions once and get two things from the registration:
//!
//! * a subcommand CLI whose arguments are derived from each function's
//!   [`Signature`] (required parameters become typed positionals, defaulted
//!   ones become abbreviated `--flags`, variadic ones capture raw tokens);
//! * a [`LogManager`] with one [`NamedLogger`] per command, a file sink per
//!   run, count and age based retention, and removal of empty log artifacts
//!   on exit.
//!
//! ```no_run
//! use sutools::{CliConfig, Handler, LoggerConfig, Param, ParamType, Registry, Signature};
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     "add",
//!     Signature::new()
//!         .param(Param::new("x").typed(ParamType::Int))
//!         .param(Param::new("y").typed(ParamType::Int).default(2))
//!         .doc("add two numbers"),
//!     Handler::sync(|args| Ok(args.int("x")? + args.int("y")?)),
//! );
//! registry.logger(LoggerConfig::default())?;
//! registry.cli(CliConfig::new("math helpers")).run_env();
//! # Ok::<(), sutools::SutoolsError>(())
//! ```

pub mod bench;
pub mod cli;
pub mod global;
pub mod helpers;
pub mod instrumentation;
pub mod logger;
pub mod registry;

pub use bench::bench::{Bench, BenchSample, Summary};
pub use cli::{
    dispatcher::{Cli, Outcome, split_variadic},
    parser::{CommandSpec, OptionalFlag, ParserTree, assign_abbreviations, build_parser},
};
pub use helpers::{
    errors::{Result, SutoolsError, TimeoutParseError},
    load_config::{CliConfig, FileMode, LoggerConfig, StreamTarget},
};
pub use logger::{
    cleanup::{CleanupReport, remove_empty_artifacts},
    format::LogFormat,
    manager::{ExitGuard, LifecycleState, LogManager, Loggers, NamedLogger},
    retention::{CapReport, LogFile, TimeUnit, TimeoutWindow, cap, scan_logs, timeout},
};
pub use registry::{
    models::{Args, FunctionRecord, Handler, Output, ParamType, Value},
    registry::Registry,
    signature::{Param, Signature, Variadic, inspect},
};
pub use tracing::{Level, level_filters::LevelFilter};
