//! Parses a command line, marshals arguments and runs the chosen handler.

// Local crates
use crate::{
    cli::parser::{CommandSpec, ParserTree, build_parser},
    helpers::{
        errors::{Result, SutoolsError},
        load_config::{CliConfig, program_name},
    },
    logger::manager::LogManager,
    registry::models::{Args, FunctionRecord, Handler, HandlerResult, Value},
};

// External crates
use clap::{
    ArgMatches,
    error::{Error as ClapError, ErrorKind},
};
use std::process;
use tracing::instrument;

/// What a single dispatch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No command given; carries the rendered top-level help.
    Help(String),
    /// A command ran. `output` is `None` when it returned nothing printable.
    Completed {
        /// Subcommand that ran.
        command: String,
        /// Printable result.
        output: Option<String>,
    },
}

/// Subcommand CLI synthesized from a set of registered functions.
#[derive(Debug)]
pub struct Cli {
    tree: ParserTree,
    records: Vec<FunctionRecord>,
    logs: Option<LogManager>,
}

impl Cli {
    /// Build the parser tree. With `config.logs == false` every named logger
    /// of `logs` is muted for the lifetime of the process.
    pub fn new(config: &CliConfig, records: Vec<FunctionRecord>, logs: Option<LogManager>) -> Self {
        let program = config.program.clone().unwrap_or_else(program_name);
        let tree = build_parser(&program, config.description.as_deref(), &records);

        if !config.logs {
            if let Some(manager) = &logs {
                manager.loggers().mute_all();
            }
        }

        Self {
            tree,
            records,
            logs,
        }
    }

    /// Parser tree the CLI dispatches through.
    pub fn parser(&self) -> &ParserTree {
        &self.tree
    }

    /// Log manager attached at construction, if any.
    pub fn logs(&self) -> Option<&LogManager> {
        self.logs.as_ref()
    }

    /// Parse `argv` (program name first), run the chosen command and hand back
    /// what it produced. Nothing is printed and the process is left alone.
    #[instrument(name = "sutools_cli::dispatch", target = "cli::dispatcher", level = "debug", skip_all)]
    pub fn dispatch<I, T>(&self, argv: I) -> Result<Outcome>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            argv.push(self.tree.command.get_name().to_string());
        }
        let argv = self.tree.expand_abbreviations(argv);

        let matches = self.tree.command.clone().try_get_matches_from(argv)?;
        let Some((command, sub)) = matches.subcommand() else {
            return Ok(Outcome::Help(self.tree.render_help()));
        };

        let record = self
            .records
            .iter()
            .find(|r| r.name == command)
            .ok_or_else(|| SutoolsError::UnknownCommand(command.to_string()))?;
        let spec = self
            .tree
            .spec(command)
            .ok_or_else(|| SutoolsError::UnknownCommand(command.to_string()))?;

        let args = marshal(record, spec, sub).map_err(|err| match err {
            SutoolsError::MissingArgument(name) => self.missing_argument(command, &name),
            other => other,
        })?;
        tracing::debug!(command, is_async = record.handler.is_async(), "Dispatching command");

        let output = invoke(&record.handler, args)?;
        Ok(Outcome::Completed {
            command: command.to_string(),
            output,
        })
    }

    /// Dispatch, print, run exit cleanup and terminate the process.
    ///
    /// Exit status is 0 after help or a successful command, 2 on a parse
    /// error and 1 when the command itself fails.
    pub fn run<I, T>(&self, argv: I) -> !
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let result = self.dispatch(argv);
        self.close_logs();

        match result {
            Ok(Outcome::Help(help)) => {
                print!("{help}");
                process::exit(0)
            }
            Ok(Outcome::Completed { output, .. }) => {
                if let Some(output) = output {
                    println!("{output}");
                }
                process::exit(0)
            }
            Err(SutoolsError::Parse(err)) => err.exit(),
            Err(err) => {
                tracing::debug!(error = %err, "Command failed");
                match err {
                    SutoolsError::Handler(err) => eprintln!("Error: {err:?}"),
                    other => eprintln!("Error: {other}"),
                }
                process::exit(1)
            }
        }
    }

    /// [`Cli::run`] over the live process arguments.
    pub fn run_env(&self) -> ! {
        self.run(std::env::args())
    }

    /// Usage error for a required parameter a variadic command did not get,
    /// shaped like clap's own so [`Cli::run`] reports it the same way.
    fn missing_argument(&self, command: &str, name: &str) -> SutoolsError {
        let mut root = self.tree.command.clone();
        root.build();
        let err = ClapError::raw(
            ErrorKind::MissingRequiredArgument,
            format!("the following required arguments were not provided:\n  <{name}>\n"),
        );
        let err = match root.find_subcommand_mut(command) {
            Some(sub) => err.format(sub),
            None => err.format(&mut root),
        };
        SutoolsError::Parse(err)
    }

    fn close_logs(&self) {
        if let Some(manager) = &self.logs {
            manager.close();
        }
    }
}

fn marshal(record: &FunctionRecord, spec: &CommandSpec, sub: &ArgMatches) -> Result<Args> {
    let mut args = Args::new(record.name.clone());

    match &spec.variadic {
        Some(id) => {
            let raw: Vec<String> = sub
                .get_many::<String>(id)
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            let (positional, mut keywords) = split_variadic(raw);
            let mut positional = positional.into_iter();

            for name in record.declared_params().filter(|n| !record.is_optional(n)) {
                let value = match positional.next() {
                    Some(token) => token,
                    None => match keywords.iter().position(|(k, _)| k == name) {
                        Some(index) => keywords.remove(index).1,
                        None => return Err(SutoolsError::MissingArgument(name.to_string())),
                    },
                };
                args.insert(name, Value::Str(value));
            }
            args.set_variadic(positional.collect(), keywords);
        }
        None => {
            for name in &spec.required {
                let value = sub
                    .get_one::<Value>(name)
                    .cloned()
                    .ok_or_else(|| SutoolsError::MissingArgument(name.clone()))?;
                args.insert(name.clone(), value);
            }
        }
    }

    // an absent flag takes the function's own default, not a re-parse of it
    for name in record.declared_params().filter(|n| record.is_optional(n)) {
        let passed = spec
            .optional
            .iter()
            .any(|flag| flag.name == name)
            .then(|| sub.get_one::<Value>(name))
            .flatten();
        if let Some(value) = passed.or_else(|| record.defaults.get(name)) {
            args.insert(name, value.clone());
        }
    }

    // reorder to declaration order so `Args::values` mirrors the signature
    let mut ordered = Args::new(record.name.clone());
    for name in record.declared_params() {
        if let Ok(value) = args.value(name) {
            ordered.insert(name, value.clone());
        }
    }
    ordered.set_variadic(args.positional().to_vec(), args.keywords().to_vec());
    Ok(ordered)
}

/// Tokens holding `=` become keywords split on the first `=`; the rest stay
/// positional. Values are never coerced, so `a=b=c` yields `("a", "b=c")`.
pub fn split_variadic(raw: Vec<String>) -> (Vec<String>, Vec<(String, String)>) {
    let mut positional = Vec::new();
    let mut keywords = Vec::new();

    for token in raw {
        match token.split_once('=') {
            Some((key, value)) => keywords.push((key.to_string(), value.to_string())),
            None => positional.push(token),
        }
    }

    (positional, keywords)
}

/// Run a handler to completion. Async handlers get a fresh current-thread
/// runtime that is dropped before returning.
fn invoke(handler: &Handler, args: Args) -> Result<Option<String>> {
    let result: HandlerResult = match handler {
        Handler::Sync(f) => f(&args),
        Handler::Async(f) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(SutoolsError::Runtime)?;
            runtime.block_on(f(args))
        }
    };

    result
        .map(|output| output.filter(|s| !s.is_empty()))
        .map_err(SutoolsError::Handler)
}
