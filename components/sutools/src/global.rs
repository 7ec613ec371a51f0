//! Process-wide registry for scripts that want decorator-style ergonomics:
//! register functions from anywhere, then hand control to [`cli`].
//!
//! The lock is only held while the registry is read or mutated, never while a
//! command runs, so handlers may call [`log`] freely.

// Local crates
use crate::{
    cli::dispatcher::Cli,
    helpers::{
        errors::Result,
        load_config::{CliConfig, LoggerConfig},
    },
    logger::manager::{LogManager, Loggers},
    registry::{
        models::{Args, Handler, Output},
        registry::Registry,
        signature::Signature,
    },
};

// External crates
use lazy_static::lazy_static;
use std::sync::{Mutex, MutexGuard, PoisonError};

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());
}

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Register `handler` under `name` and hand it back unchanged.
pub fn register(name: &str, signature: Signature, handler: Handler) -> Handler {
    registry().register(name, signature, handler)
}

/// Async counterpart of [`register`].
pub fn register_async<F, Fut, R>(name: &str, signature: Signature, f: F) -> Handler
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Output + Send + 'static,
{
    registry().register_async(name, signature, f)
}

/// Build the log manager for the functions registered so far.
pub fn logger(config: LoggerConfig) -> Result<LogManager> {
    registry().logger(config)
}

/// Named loggers of the global log manager. Empty until [`logger`] ran, in
/// which case every lookup yields a disabled logger.
pub fn log() -> Loggers {
    registry().loggers().unwrap_or_default()
}

/// Registered command names in registration order.
pub fn names() -> Vec<String> {
    registry().names()
}

/// Build the CLI from the global registry without running it.
pub fn build_cli(config: CliConfig) -> Cli {
    registry().cli(config)
}

/// Build the CLI, run the command named on the process command line and
/// exit.
pub fn cli(config: CliConfig) -> ! {
    let cli = build_cli(config);
    cli.run_env()
}

/// Drop every registration and the attached log manager.
pub fn reset() {
    *registry() = Registry::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::dispatcher::Outcome;
    use serial_test::serial;

    #[test]
    #[serial]
    fn handlers_can_log_through_the_global_registry() {
        reset();
        register(
            "whoami",
            Signature::new(),
            Handler::sync(|args| {
                log().named(args.command()).info("running");
                Ok(args.command().to_string())
            }),
        );

        let cli = build_cli(CliConfig::new("global"));
        let outcome = cli.dispatch(["prog", "whoami"]).expect("dispatch");
        assert_eq!(
            outcome,
            Outcome::Completed {
                command: "whoami".to_string(),
                output: Some("whoami".to_string()),
            }
        );
        reset();
    }

    #[test]
    #[serial]
    fn reset_clears_registrations() {
        reset();
        register("a", Signature::new(), Handler::sync(|_| Ok(())));
        register_async("b", Signature::new(), |_args| async { Ok::<_, anyhow::Error>(()) });
        assert_eq!(names(), vec!["a", "b"]);
        assert!(log().is_empty());

        reset();
        assert!(names().is_empty());
    }
}
