//! Values, parameter types, marshalled arguments and handlers.

// Local crates
use crate::helpers::errors::{Result, SutoolsError};

// External crates
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A concrete argument value, either a declared default or the result of
/// coercing a command-line token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Plain string, also the result of untyped parameters.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Filesystem path.
    Path(PathBuf),
}

impl Value {
    /// Short type name used in help text and type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Path(_) => "path",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Value::Path(value)
    }
}

/// Converter used by [`ParamType::Custom`].
pub type Converter = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

/// Declared type of a parameter. Doubles as the coercion function applied to
/// the raw command-line token.
#[derive(Clone)]
pub enum ParamType {
    /// Token passed through unchanged.
    Str,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// Accepts `true/false`, `yes/no`, `y/n`, `on/off` and `1/0`.
    Bool,
    /// Filesystem path, not checked for existence.
    Path,
    /// Caller supplied converter. It is accepted as-is at registration and
    /// only fails when a token is actually parsed.
    Custom { name: String, convert: Converter },
}

impl ParamType {
    /// Build a [`ParamType::Custom`] from a conversion closure.
    pub fn custom<F>(name: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        ParamType::Custom {
            name: name.into(),
            convert: Arc::new(convert),
        }
    }

    /// Type inferred from a default value, for parameters declared without one.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Str(_) => ParamType::Str,
            Value::Int(_) => ParamType::Int,
            Value::Float(_) => ParamType::Float,
            Value::Bool(_) => ParamType::Bool,
            Value::Path(_) => ParamType::Path,
        }
    }

    /// Name shown in help text.
    pub fn name(&self) -> &str {
        match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::Path => "path",
            ParamType::Custom { name, .. } => name,
        }
    }

    /// Coerce a raw token into a [`Value`].
    pub fn convert(&self, raw: &str) -> Result<Value, String> {
        match self {
            ParamType::Str => Ok(Value::Str(raw.to_string())),
            ParamType::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| e.to_string()),
            ParamType::Float => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| e.to_string()),
            ParamType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "n" | "off" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("`{other}` is not a boolean")),
            },
            ParamType::Path => Ok(Value::Path(PathBuf::from(raw))),
            ParamType::Custom { convert, .. } => convert(raw),
        }
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Custom { name, .. } => f.debug_tuple("Custom").field(name).finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl PartialEq for ParamType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ParamType::Custom { name: a, convert: f },
                ParamType::Custom { name: b, convert: g },
            ) => a == b && Arc::ptr_eq(f, g),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

/// Marshalled arguments for one invocation of a registered function.
///
/// Declared parameters are stored by name in declaration order. Variadic
/// functions additionally receive the raw leftover tokens, split into
/// positional tokens and `key=value` keywords.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    command: String,
    values: Vec<(String, Value)>,
    positional: Vec<String>,
    keywords: Vec<(String, String)>,
}

impl Args {
    /// Empty arguments for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Builder-style insert, mostly useful when calling a handler directly.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub(crate) fn set_variadic(&mut self, positional: Vec<String>, keywords: Vec<(String, String)>) {
        self.positional = positional;
        self.keywords = keywords;
    }

    /// Name of the command these arguments were parsed for.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Raw value of a declared parameter.
    pub fn value(&self, name: &str) -> Result<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| SutoolsError::MissingArgument(name.to_string()))
    }

    /// Value of a string parameter.
    pub fn str(&self, name: &str) -> Result<&str> {
        match self.value(name)? {
            Value::Str(s) => Ok(s),
            _ => Err(mismatch(name, "str")),
        }
    }

    /// Value of an integer parameter.
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.value(name)? {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch(name, "int")),
        }
    }

    /// Integers are widened to floats.
    pub fn float(&self, name: &str) -> Result<f64> {
        match self.value(name)? {
            Value::Float(x) => Ok(*x),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(mismatch(name, "float")),
        }
    }

    /// Value of a boolean parameter.
    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.value(name)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(mismatch(name, "bool")),
        }
    }

    /// Strings are accepted as paths too.
    pub fn path(&self, name: &str) -> Result<&Path> {
        match self.value(name)? {
            Value::Path(p) => Ok(p),
            Value::Str(s) => Ok(Path::new(s)),
            _ => Err(mismatch(name, "path")),
        }
    }

    /// Declared parameter values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Leftover positional tokens of a variadic call.
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// `key=value` tokens of a variadic call, in the order given.
    pub fn keywords(&self) -> &[(String, String)] {
        &self.keywords
    }

    /// First keyword called `key`.
    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn mismatch(name: &str, expected: &'static str) -> SutoolsError {
    SutoolsError::TypeMismatch {
        name: name.to_string(),
        expected,
    }
}

/// Conversion of a handler's return value into something printable.
///
/// `None` means "nothing to print": unit, empty strings and empty vectors
/// all map to it.
pub trait Output {
    fn into_output(self) -> Option<String>;
}

impl Output for () {
    fn into_output(self) -> Option<String> {
        None
    }
}

impl Output for String {
    fn into_output(self) -> Option<String> {
        (!self.is_empty()).then_some(self)
    }
}

impl Output for &str {
    fn into_output(self) -> Option<String> {
        self.to_string().into_output()
    }
}

impl Output for Value {
    fn into_output(self) -> Option<String> {
        self.to_string().into_output()
    }
}

impl<T: Output> Output for Option<T> {
    fn into_output(self) -> Option<String> {
        self.and_then(Output::into_output)
    }
}

impl<T: Output> Output for Vec<T> {
    fn into_output(self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let items: Vec<String> = self
            .into_iter()
            .map(|item| item.into_output().unwrap_or_default())
            .collect();
        Some(format!("[{}]", items.join(", ")))
    }
}

macro_rules! display_output {
    ($($t:ty),*) => {
        $(impl Output for $t {
            fn into_output(self) -> Option<String> {
                Some(self.to_string())
            }
        })*
    };
}

display_output!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

/// Result type every handler is normalised to.
pub type HandlerResult = anyhow::Result<Option<String>>;

/// Synchronous handler signature.
pub type SyncFn = dyn Fn(&Args) -> HandlerResult + Send + Sync;
/// Asynchronous handler signature.
pub type AsyncFn = dyn Fn(Args) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// The callable behind a command. The registry and the original call site
/// share it through an [`Arc`].
#[derive(Clone)]
pub enum Handler {
    /// Runs on the calling thread.
    Sync(Arc<SyncFn>),
    /// Runs to completion on a current-thread tokio runtime.
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wrap a synchronous closure.
    pub fn sync<F, R>(f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Output + 'static,
    {
        Handler::Sync(Arc::new(move |args: &Args| f(args).map(Output::into_output)))
    }

    /// Wrap an `async` closure. It is driven to completion on a dedicated
    /// runtime when dispatched.
    pub fn asynchronous<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Output + Send + 'static,
    {
        Handler::Async(Arc::new(move |args: Args| {
            let fut = f(args);
            Box::pin(async move { fut.await.map(Output::into_output) }) as BoxFuture<'static, _>
        }))
    }

    /// Whether the handler is async.
    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Handler::Sync(a), Handler::Sync(b)) => Arc::ptr_eq(a, b),
            (Handler::Async(a), Handler::Async(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Everything the CLI and the log manager need to know about one registered
/// function.
///
/// `parameter_types` and `defaults` never carry keys that are not in
/// `parameter_names`. For variadic functions the type map is empty and the
/// catch-all markers (`*args`, `**kwargs`) are appended to
/// `parameter_names` for documentation only.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    /// Command name.
    pub name: String,
    /// Function the command calls.
    pub handler: Handler,
    /// Declared parameter names in order, followed by variadic markers.
    pub parameter_names: Vec<String>,
    /// Declared types, only for typed parameters.
    pub parameter_types: BTreeMap<String, ParamType>,
    /// Defaults, only for defaulted parameters.
    pub defaults: BTreeMap<String, Value>,
    /// Doc text shown in help.
    pub description: Option<String>,
    /// Declared return type name.
    pub return_type: Option<String>,
    /// Takes variadic positionals or keywords.
    pub is_variadic: bool,
}

impl FunctionRecord {
    /// Declared parameters, excluding the synthetic catch-all markers.
    pub fn declared_params(&self) -> impl Iterator<Item = &str> {
        self.parameter_names
            .iter()
            .map(String::as_str)
            .filter(|n| !n.starts_with('*'))
    }

    /// Catch-all markers such as `*args` or `**kwargs`.
    pub fn variadic_markers(&self) -> impl Iterator<Item = &str> {
        self.parameter_names
            .iter()
            .map(String::as_str)
            .filter(|n| n.starts_with('*'))
    }

    /// Whether `param` has a default.
    pub fn is_optional(&self, param: &str) -> bool {
        self.defaults.contains_key(param)
    }

    /// Help line shown in the command listing.
    pub fn help(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("execute {} function", self.name))
    }

    /// Pseudo call signature, e.g. `add(x: int, y: int = 2) -> int`.
    pub fn signature_line(&self) -> String {
        let params: Vec<String> = self
            .parameter_names
            .iter()
            .map(|name| {
                let mut rendered = name.clone();
                if let Some(ty) = self.parameter_types.get(name) {
                    rendered.push_str(": ");
                    rendered.push_str(ty.name());
                }
                if let Some(default) = self.defaults.get(name) {
                    match default {
                        Value::Str(s) => rendered.push_str(&format!(" = {s:?}")),
                        other => rendered.push_str(&format!(" = {other}")),
                    }
                }
                rendered
            })
            .collect();

        let mut line = format!("{}({})", self.name, params.join(", "));
        if let Some(ret) = &self.return_type {
            line.push_str(" -> ");
            line.push_str(ret);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_types_coerce_tokens() {
        assert_eq!(ParamType::Int.convert("42"), Ok(Value::Int(42)));
        assert!(ParamType::Int.convert("forty").is_err());
        assert_eq!(ParamType::Float.convert("1.5"), Ok(Value::Float(1.5)));
        assert_eq!(ParamType::Bool.convert("Yes"), Ok(Value::Bool(true)));
        assert_eq!(ParamType::Bool.convert("0"), Ok(Value::Bool(false)));
        assert!(ParamType::Bool.convert("maybe").is_err());
        assert_eq!(ParamType::Str.convert(" raw "), Ok(Value::from(" raw ")));
    }

    #[test]
    fn custom_converter_failure_is_reported_not_panicked() {
        let ty = ParamType::custom("even", |raw| match raw.parse::<i64>() {
            Ok(n) if n % 2 == 0 => Ok(Value::Int(n)),
            _ => Err(format!("{raw} is not even")),
        });
        assert_eq!(ty.name(), "even");
        assert_eq!(ty.convert("4"), Ok(Value::Int(4)));
        assert_eq!(ty.convert("3"), Err("3 is not even".to_string()));
    }

    #[test]
    fn args_accessors_check_types() {
        let args = Args::new("add").with("x", 1).with("name", "bob").with("ratio", 0.5);
        assert_eq!(args.command(), "add");
        assert_eq!(args.int("x").ok(), Some(1));
        assert_eq!(args.float("x").ok(), Some(1.0));
        assert_eq!(args.str("name").ok(), Some("bob"));
        assert!(matches!(
            args.int("name"),
            Err(SutoolsError::TypeMismatch { expected: "int", .. })
        ));
        assert!(matches!(
            args.value("missing"),
            Err(SutoolsError::MissingArgument(name)) if name == "missing"
        ));
    }

    #[test]
    fn output_maps_empty_values_to_none() {
        assert_eq!(().into_output(), None);
        assert_eq!(String::new().into_output(), None);
        assert_eq!("hi".into_output(), Some("hi".to_string()));
        assert_eq!(Some(3).into_output(), Some("3".to_string()));
        assert_eq!(None::<i32>.into_output(), None);
        assert_eq!(Vec::<i32>::new().into_output(), None);
        assert_eq!(vec![1, 2].into_output(), Some("[1, 2]".to_string()));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let a = Handler::sync(|_| Ok(()));
        let b = a.clone();
        let c = Handler::sync(|_| Ok(()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
