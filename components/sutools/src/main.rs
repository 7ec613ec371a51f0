//! `sutools-demo`: a handful of sample commands wired through the global registry.

use anyhow::Result;
use std::time::Duration;
use sutools::{
    CliConfig, Handler, LoggerConfig, Param, ParamType, Signature, Variadic, global,
    instrumentation,
};

const DESCRIPTION: &str = "This module does random stuff.";

/// TOML file with a `LoggerConfig`, used instead of the built-in defaults.
const CONFIG_ENV: &str = "SUTOOLS_CONFIG";

fn main() -> Result<()> {
    instrumentation::tracing::init_tracing();
    instrumentation::tracing::init_panic_handler();

    register_commands();

    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => LoggerConfig::load(path)?,
        None => LoggerConfig {
            filecap: Some(5),
            ..LoggerConfig::default()
        },
    };
    let logs = global::logger(config)?;
    tracing::debug!(log_file = ?logs.log_path(), "Loggers attached");

    // Main entrypoint simply hands control to the synthesized CLI, which
    // runs exactly one command and exits.
    global::cli(CliConfig::new(DESCRIPTION).with_logs(true))
}

fn register_commands() {
    global::register(
        "echo",
        Signature::new()
            .param(Param::new("string").typed(ParamType::Str))
            .doc("echo a string"),
        Handler::sync(|args| {
            global::log().named("echo").info("this is a test");
            Ok(args.str("string")?.to_string())
        }),
    );

    global::register(
        "add",
        Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("y").typed(ParamType::Int).default(2))
            .doc("add two integers")
            .returns("int"),
        Handler::sync(|args| {
            let sum = args.int("x")? + args.int("y")?;
            global::log().named("add").info(format!("sum is {sum}"));
            Ok(sum)
        }),
    );

    global::register(
        "minus",
        Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("y").typed(ParamType::Int)),
        Handler::sync(|args| {
            global::log().named("minus").info(args.int("x")? - args.int("y")?);
            Ok(())
        }),
    );

    global::register(
        "do",
        Signature::new(),
        Handler::sync(|args| {
            global::log().named("do").debug("this function is do do");
            Ok(format!("do {}", args.command()))
        }),
    );

    global::register(
        "greet",
        Signature::new()
            .param(Param::new("name"))
            .param(Param::new("greeting").default("hello"))
            .param(Param::new("loud").typed(ParamType::Bool).default(false))
            .doc("greet someone"),
        Handler::sync(|args| {
            let line = format!("{}, {}", args.str("greeting")?, args.str("name")?);
            Ok(if args.bool("loud")? { line.to_uppercase() } else { line })
        }),
    );

    global::register_async(
        "wait",
        Signature::new()
            .param(Param::new("ms").typed(ParamType::Int).default(10))
            .doc("sleep asynchronously, then report"),
        |args| async move {
            let ms = u64::try_from(args.int("ms")?)?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            global::log().named("wait").info(format!("waited {ms}ms"));
            Ok::<_, anyhow::Error>(format!("waited {ms}ms"))
        },
    );

    global::register(
        "collect",
        Signature::new()
            .param(Param::new("first"))
            .variadic(Variadic::Positional("args".into()))
            .variadic(Variadic::Keyword("kwargs".into()))
            .doc("show how extra tokens are split"),
        Handler::sync(|args| {
            let mut lines = vec![format!("first={}", args.str("first")?)];
            lines.extend(args.positional().iter().map(|p| format!("arg {p}")));
            lines.extend(args.keywords().iter().map(|(k, v)| format!("kw {k}={v}")));
            Ok(lines.join("\n"))
        }),
    );

    global::register(
        "fail",
        Signature::new().doc("always fails"),
        Handler::sync(|_| -> anyhow::Result<()> { anyhow::bail!("this command always fails") }),
    );
}
