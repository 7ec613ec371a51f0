//! Builds the clap command tree from function records.

// Local crates
use crate::registry::models::{FunctionRecord, ParamType, Value};

// External crates
use clap::{
    Arg, ArgAction, Command,
    builder::TypedValueParser,
    error::{Error as ClapError, ErrorKind},
};
use std::collections::HashSet;
use std::ffi::OsStr;
use tracing::instrument;

/// Argument id of the per-subcommand help flag. Not a valid parameter name,
/// so it never clashes with a positional.
pub const HELP_ARG: &str = "sutools-help";

/// Abbreviations already taken before any parameter is seen.
const RESERVED_ABBREVIATIONS: &[&str] = &["h"];

/// Long flags already taken before any parameter is seen.
const RESERVED_LONGS: &[&str] = &["help"];

/// Coerces a raw token through a parameter's declared type.
#[derive(Clone)]
struct ValueConverter(ParamType);

impl TypedValueParser for ValueConverter {
    type Value = Value;

    fn parse_ref(
        &self,
        cmd: &Command,
        arg: Option<&Arg>,
        value: &OsStr,
    ) -> Result<Self::Value, ClapError> {
        let raw = value
            .to_str()
            .ok_or_else(|| ClapError::new(ErrorKind::InvalidUtf8).with_cmd(cmd))?;

        self.0.convert(raw).map_err(|reason| {
            let arg = arg
                .map(ToString::to_string)
                .unwrap_or_else(|| "...".to_string());
            ClapError::raw(
                ErrorKind::ValueValidation,
                format!(
                    "invalid {} value '{raw}' for '{arg}': {reason}\n",
                    self.0.name()
                ),
            )
            .with_cmd(cmd)
        })
    }
}

/// How a defaulted parameter is exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalFlag {
    /// Parameter name, also the `--long` flag.
    pub name: String,
    /// `-x` for one character, `-xy` for two; `None` when both candidates
    /// were already taken.
    pub abbreviation: Option<String>,
}

/// Derived argument layout of one subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Subcommand name.
    pub name: String,
    /// Required positionals in declaration order. Empty for variadic
    /// commands, whose positionals are all captured by `variadic`.
    pub required: Vec<String>,
    /// Defaulted parameters, exposed as flags.
    pub optional: Vec<OptionalFlag>,
    /// Id of the greedy positional capturing raw tokens.
    pub variadic: Option<String>,
}

/// Root parser plus the per-command layout it was derived from.
#[derive(Debug, Clone)]
pub struct ParserTree {
    /// Root clap command.
    pub command: Command,
    /// One layout per subcommand, in registry order.
    pub commands: Vec<CommandSpec>,
}

impl ParserTree {
    /// Layout of the subcommand called `name`.
    pub fn spec(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Rewrite two-character abbreviations (`-ab`, `-ab=1`) into their long
    /// form. Only tokens after the subcommand name and before `--` are
    /// touched; one-character abbreviations are native clap shorts.
    pub fn expand_abbreviations(&self, argv: Vec<String>) -> Vec<String> {
        let mut spec: Option<&CommandSpec> = None;
        let mut passthrough = false;
        let mut expanded = Vec::with_capacity(argv.len());

        for (index, token) in argv.into_iter().enumerate() {
            if index == 0 || passthrough {
                expanded.push(token);
                continue;
            }
            let Some(current) = spec else {
                if !token.starts_with('-') {
                    spec = self.spec(&token);
                }
                expanded.push(token);
                continue;
            };
            if token == "--" {
                passthrough = true;
                expanded.push(token);
                continue;
            }
            expanded.push(expand_token(current, token));
        }

        expanded
    }

    /// Top-level help text.
    pub fn render_help(&self) -> String {
        self.command.clone().render_help().to_string()
    }
}

fn expand_token(spec: &CommandSpec, token: String) -> String {
    let Some(body) = token.strip_prefix('-').filter(|b| !b.starts_with('-')) else {
        return token;
    };
    let (abbr, value) = match body.split_once('=') {
        Some((abbr, value)) => (abbr, Some(value)),
        None => (body, None),
    };

    let long = spec
        .optional
        .iter()
        .filter(|flag| flag.abbreviation.as_deref().is_some_and(|a| a.chars().count() > 1))
        .find(|flag| flag.abbreviation.as_deref() == Some(abbr))
        .map(|flag| &flag.name);

    match (long, value) {
        (Some(long), Some(value)) => format!("--{long}={value}"),
        (Some(long), None) => format!("--{long}"),
        (None, _) => token,
    }
}

/// Pick an abbreviation for each defaulted parameter, in order: the first two
/// characters, else the last character, else none.
pub fn assign_abbreviations<'a, I>(names: I) -> Vec<Option<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut used: HashSet<String> = RESERVED_ABBREVIATIONS.iter().map(|s| s.to_string()).collect();

    names
        .into_iter()
        .map(|name| {
            let prefix: String = name.chars().take(2).collect();
            let last: String = name.chars().last().map(String::from).unwrap_or_default();

            if !prefix.is_empty() && used.insert(prefix.clone()) {
                Some(prefix)
            } else if !last.is_empty() && used.insert(last.clone()) {
                Some(last)
            } else {
                None
            }
        })
        .collect()
}

/// Build the root parser with one subcommand per record, in registry order.
#[instrument(
    name = "sutools_cli::build_parser",
    target = "cli::parser",
    level = "debug",
    skip(records),
    fields(commands = records.len())
)]
pub fn build_parser(program: &str, description: Option<&str>, records: &[FunctionRecord]) -> ParserTree {
    let mut root = Command::new(program.to_string())
        .subcommand_required(false)
        .disable_help_subcommand(true)
        .subcommand_value_name("command")
        .subcommand_help_heading("commands");
    if let Some(description) = description {
        root = root.about(description.to_string());
    }

    let mut commands = Vec::with_capacity(records.len());
    for record in records {
        let (subcommand, spec) = build_subcommand(record);
        root = root.subcommand(subcommand);
        commands.push(spec);
    }

    ParserTree {
        command: root,
        commands,
    }
}

fn build_subcommand(record: &FunctionRecord) -> (Command, CommandSpec) {
    let mut long_about = record.signature_line();
    if let Some(description) = &record.description {
        long_about.push_str("\n\n");
        long_about.push_str(description);
    }

    let mut cmd = Command::new(record.name.clone())
        .about(record.help())
        .long_about(long_about)
        .disable_help_flag(true);

    let variadic_id = record.is_variadic.then(|| {
        record
            .variadic_markers()
            .next()
            .map(|marker| marker.trim_start_matches('*').to_string())
            .unwrap_or_else(|| "args".to_string())
    });

    // a flag that would shadow `--help` or the variadic capture is not
    // exposed; the handler still receives its default
    let optional_names: Vec<&str> = record
        .declared_params()
        .filter(|name| record.is_optional(name))
        .filter(|name| {
            let clashes = RESERVED_LONGS.contains(name) || variadic_id.as_deref() == Some(*name);
            if clashes {
                tracing::warn!(command = %record.name, flag = %name, "Flag name is reserved, keeping its default");
            }
            !clashes
        })
        .collect();
    let abbreviations = assign_abbreviations(optional_names.iter().copied());

    let mut spec = CommandSpec {
        name: record.name.clone(),
        required: Vec::new(),
        optional: Vec::new(),
        variadic: None,
    };

    for name in record.declared_params() {
        let ty = record.parameter_types.get(name).cloned();

        if let Some(default) = record.defaults.get(name) {
            let Some(index) = optional_names.iter().position(|n| *n == name) else {
                continue;
            };
            let abbreviation = abbreviations[index].clone();
            cmd = cmd.arg(optional_arg(name, ty, default, abbreviation.as_deref()));
            spec.optional.push(OptionalFlag {
                name: name.to_string(),
                abbreviation,
            });
        } else if !record.is_variadic {
            let mut arg = Arg::new(name.to_string())
                .required(true)
                .value_parser(ValueConverter(ty.clone().unwrap_or(ParamType::Str)));
            if let Some(ty) = &ty {
                arg = arg.help(ty.name().to_string());
            }
            cmd = cmd.arg(arg);
            spec.required.push(name.to_string());
        }
    }

    if let Some(id) = variadic_id {
        let declared: Vec<&str> = record
            .declared_params()
            .filter(|name| !record.is_optional(name))
            .collect();
        let help = if declared.is_empty() {
            "positional values and key=value pairs".to_string()
        } else {
            format!("{} then extra values and key=value pairs", declared.join(", "))
        };

        cmd = cmd.arg(
            Arg::new(id.clone())
                .num_args(0..)
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(String))
                .help(help),
        );
        spec.variadic = Some(id);
    }

    // help goes last so usage lists it after the function's own arguments
    cmd = cmd.arg(
        Arg::new(HELP_ARG)
            .short('h')
            .long("help")
            .action(ArgAction::Help)
            .help("Print help"),
    );

    tracing::trace!(
        command = %record.name,
        required = spec.required.len(),
        optional = spec.optional.len(),
        variadic = spec.variadic.is_some(),
        "Synthesized subcommand"
    );

    (cmd, spec)
}

/// Defaulted parameter as a `--name` flag. No clap default is set: an absent
/// flag is filled from the record's own default value at dispatch. Untyped
/// parameters coerce like their default.
fn optional_arg(name: &str, ty: Option<ParamType>, default: &Value, abbreviation: Option<&str>) -> Arg {
    let mut help: Vec<String> = Vec::with_capacity(3);
    let mut arg = Arg::new(name.to_string()).long(name.to_string());

    match abbreviation {
        Some(abbr) if abbr.chars().count() == 1 => {
            if let Some(short) = abbr.chars().next() {
                arg = arg.short(short);
            }
        }
        Some(abbr) => help.push(format!("[-{abbr}]")),
        None => {}
    }
    let ty = ty.unwrap_or_else(|| ParamType::of(default));
    help.push(ty.name().to_string());
    help.push(format!("[default: {default}]"));

    arg.value_parser(ValueConverter(ty))
        .help(help.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        models::Handler,
        signature::{Param, Signature, Variadic, inspect},
    };

    fn record(name: &str, signature: Signature) -> FunctionRecord {
        inspect(name, signature, Handler::sync(|_| Ok(())))
    }

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn abbreviations_fall_back_then_give_up() {
        let assigned = assign_abbreviations(["verbose", "version", "vn", "count"]);
        assert_eq!(
            assigned,
            vec![
                Some("ve".to_string()),
                Some("n".to_string()),
                None,
                Some("co".to_string()),
            ]
        );
    }

    #[test]
    fn h_is_reserved_for_help() {
        assert_eq!(assign_abbreviations(["h"]), vec![None]);
        assert_eq!(
            assign_abbreviations(["width", "with"]),
            vec![Some("wi".to_string()), None]
        );
    }

    #[test]
    fn required_and_optional_counts_follow_the_signature() {
        let sig = Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("y").typed(ParamType::Int))
            .param(Param::new("scale").typed(ParamType::Float).default(1.0))
            .param(Param::new("label").default("sum"));
        let tree = build_parser("prog", Some("tools"), &[record("add", sig)]);

        let spec = tree.spec("add").expect("add spec");
        assert_eq!(spec.required, vec!["x", "y"]);
        assert_eq!(spec.optional.len(), 2);
        assert_eq!(spec.optional[0].abbreviation.as_deref(), Some("sc"));
        assert_eq!(spec.optional[1].abbreviation.as_deref(), Some("la"));
        assert!(spec.variadic.is_none());

        let sub = tree.command.find_subcommand("add").expect("add subcommand");
        let ids: Vec<&str> = sub.get_arguments().map(|a| a.get_id().as_str()).collect();
        assert_eq!(ids.last(), Some(&HELP_ARG));
        assert_eq!(sub.get_positionals().count(), 2);
    }

    #[test]
    fn parses_typed_values_and_defaults() {
        let sig = Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("z").typed(ParamType::Int).default(2));
        let tree = build_parser("prog", None, &[record("add", sig)]);

        let matches = tree
            .command
            .clone()
            .try_get_matches_from(argv(&["prog", "add", "5"]))
            .expect("parse");
        let (name, sub) = matches.subcommand().expect("subcommand");
        assert_eq!(name, "add");
        assert_eq!(sub.get_one::<Value>("x"), Some(&Value::Int(5)));
        // absent flags are filled from the record at dispatch
        assert_eq!(sub.get_one::<Value>("z"), None);

        let matches = tree
            .command
            .clone()
            .try_get_matches_from(argv(&["prog", "add", "5", "-z", "7"]))
            .expect("parse with short flag");
        let (_, sub) = matches.subcommand().expect("subcommand");
        assert_eq!(sub.get_one::<Value>("z"), Some(&Value::Int(7)));
    }

    #[test]
    fn flag_help_shows_abbreviation_type_and_default() {
        let sig = Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("greeting").typed(ParamType::Str).default("hello"));
        let tree = build_parser("prog", None, &[record("greet", sig)]);

        let mut greet = tree.command.find_subcommand("greet").expect("greet").clone();
        let help = greet.render_help().to_string();
        assert!(help.contains("--greeting"));
        assert!(help.contains("[-gr] str [default: hello]"), "help was: {help}");
    }

    #[test]
    fn reserved_flag_names_are_not_exposed() {
        let sig = Signature::new()
            .param(Param::new("help").default("x"))
            .param(Param::new("args").default(1))
            .param(Param::new("level").default(2))
            .variadic(Variadic::Positional("args".into()));
        let tree = build_parser("prog", None, &[record("odd", sig)]);

        let spec = tree.spec("odd").expect("spec");
        let flags: Vec<&str> = spec.optional.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(flags, vec!["level"]);
        assert_eq!(spec.optional[0].abbreviation.as_deref(), Some("le"));

        let matches = tree
            .command
            .clone()
            .try_get_matches_from(argv(&["prog", "odd", "a", "--level", "3"]))
            .expect("parse");
        let (_, sub) = matches.subcommand().expect("subcommand");
        assert_eq!(sub.get_one::<Value>("level"), Some(&Value::Int(3)));

        let err = tree
            .command
            .clone()
            .try_get_matches_from(argv(&["prog", "odd", "--help"]))
            .expect_err("help short-circuits");
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn coercion_and_missing_arguments_are_parse_errors() {
        let sig = Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("y").typed(ParamType::Int));
        let tree = build_parser("prog", None, &[record("add", sig)]);

        let err = tree
            .command
            .clone()
            .try_get_matches_from(argv(&["prog", "add", "1", "two"]))
            .expect_err("bad int");
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        let err = tree
            .command
            .clone()
            .try_get_matches_from(argv(&["prog", "add", "1"]))
            .expect_err("missing y");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn two_character_abbreviations_are_expanded() {
        let sig = Signature::new()
            .param(Param::new("count").typed(ParamType::Int).default(1))
            .param(Param::new("colour").default("red"));
        let tree = build_parser("prog", None, &[record("paint", sig)]);

        let spec = tree.spec("paint").expect("spec");
        assert_eq!(spec.optional[0].abbreviation.as_deref(), Some("co"));
        assert_eq!(spec.optional[1].abbreviation.as_deref(), Some("r"));

        let expanded = tree.expand_abbreviations(argv(&["prog", "paint", "-co", "3", "-r", "blue", "--", "-co"]));
        assert_eq!(
            expanded,
            argv(&["prog", "paint", "--count", "3", "-r", "blue", "--", "-co"])
        );
        assert_eq!(
            tree.expand_abbreviations(argv(&["prog", "paint", "-co=4"])),
            argv(&["prog", "paint", "--count=4"])
        );
        assert_eq!(
            tree.expand_abbreviations(argv(&["prog", "-co", "paint"])),
            argv(&["prog", "-co", "paint"])
        );
    }

    #[test]
    fn variadic_commands_capture_raw_tokens() {
        let sig = Signature::new()
            .param(Param::new("first"))
            .param(Param::new("mode").default("fast"))
            .variadic(Variadic::Positional("args".into()))
            .variadic(Variadic::Keyword("kwargs".into()));
        let tree = build_parser("prog", None, &[record("collect", sig)]);

        let spec = tree.spec("collect").expect("spec");
        assert!(spec.required.is_empty());
        assert_eq!(spec.variadic.as_deref(), Some("args"));

        let matches = tree
            .command
            .clone()
            .try_get_matches_from(argv(&["prog", "collect", "a", "b", "k=v", "--mode", "slow"]))
            .expect("parse");
        let (_, sub) = matches.subcommand().expect("subcommand");
        let raw: Vec<&String> = sub.get_many::<String>("args").expect("raw tokens").collect();
        assert_eq!(raw, vec!["a", "b", "k=v"]);
        assert_eq!(sub.get_one::<Value>("mode"), Some(&Value::from("slow")));
    }

    #[test]
    fn help_uses_docstring_or_generated_text() {
        let documented = record("echo", Signature::new().param(Param::new("s")).doc("echo a string"));
        let bare = record("do", Signature::new());
        let tree = build_parser("prog", Some("This module does random stuff."), &[documented, bare]);

        let help = tree.render_help();
        assert!(help.contains("This module does random stuff."));
        assert!(help.contains("echo a string"));
        assert!(help.contains("execute do function"));

        let echo = tree.command.find_subcommand("echo").expect("echo");
        let long = echo.get_long_about().map(ToString::to_string).unwrap_or_default();
        assert!(long.starts_with("echo(s)"));
    }
}
