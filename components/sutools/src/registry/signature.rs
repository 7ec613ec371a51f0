//! Signature descriptors and their inspection into records.

// Local crates
use crate::registry::models::{FunctionRecord, Handler, ParamType, Value};

// External crates
use std::collections::BTreeMap;
use tracing::instrument;

/// One declared parameter of a registered function.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Declared type; `None` keeps tokens as strings.
    pub ty: Option<ParamType>,
    /// Default value; makes the parameter a flag.
    pub default: Option<Value>,
}

impl Param {
    /// An untyped, required parameter. Untyped values reach the handler as
    /// raw strings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: None,
        }
    }

    /// Declare the parameter type.
    pub fn typed(mut self, ty: ParamType) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Giving a default turns the parameter into an optional `--flag`.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Catch-all parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variadic {
    /// Unbounded positional values, rendered `*name`.
    Positional(String),
    /// Unbounded `key=value` pairs, rendered `**name`.
    Keyword(String),
}

impl Variadic {
    /// Name as it appears in the signature line.
    pub fn marker(&self) -> String {
        match self {
            Variadic::Positional(name) => format!("*{name}"),
            Variadic::Keyword(name) => format!("**{name}"),
        }
    }
}

/// Explicit descriptor of a function signature, supplied at registration.
///
/// ```
/// use sutools::{Param, ParamType, Signature};
///
/// let sig = Signature::new()
///     .param(Param::new("x").typed(ParamType::Int))
///     .param(Param::new("y").typed(ParamType::Int).default(2))
///     .doc("add two integers")
///     .returns("int");
/// assert_eq!(sig.params.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    /// Declared parameters in order.
    pub params: Vec<Param>,
    /// Variadic markers.
    pub variadic: Vec<Variadic>,
    /// Doc text shown in help.
    pub doc: Option<String>,
    /// Return type name, shown in the signature line.
    pub returns: Option<String>,
}

impl Signature {
    /// An empty one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a declared parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Add a variadic marker.
    pub fn variadic(mut self, variadic: Variadic) -> Self {
        self.variadic.push(variadic);
        self
    }

    /// Help text for the command.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Declare the return type name.
    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.returns = Some(type_name.into());
        self
    }
}

/// Turn a signature descriptor into a [`FunctionRecord`].
///
/// Nothing is validated here. A custom converter that cannot handle its
/// input only fails once a token is parsed.
#[instrument(
    name = "sutools_registry::inspect",
    target = "registry::signature",
    level = "trace",
    skip(signature, handler)
)]
pub fn inspect(name: &str, signature: Signature, handler: Handler) -> FunctionRecord {
    let mut parameter_names = Vec::with_capacity(signature.params.len() + signature.variadic.len());
    let mut parameter_types = BTreeMap::new();
    let mut defaults = BTreeMap::new();

    for param in signature.params {
        if let Some(ty) = param.ty {
            parameter_types.insert(param.name.clone(), ty);
        }
        if let Some(default) = param.default {
            defaults.insert(param.name.clone(), default);
        }
        parameter_names.push(param.name);
    }

    let is_variadic = !signature.variadic.is_empty();
    if is_variadic {
        // catch-all values are untyped at the CLI boundary
        parameter_types.clear();
        parameter_names.extend(signature.variadic.iter().map(Variadic::marker));
    }

    let description = signature
        .doc
        .map(|doc| doc.trim().to_string())
        .filter(|doc| !doc.is_empty());

    tracing::trace!(
        command = name,
        params = parameter_names.len(),
        optional = defaults.len(),
        is_variadic,
        is_async = handler.is_async(),
        "Inspected function signature"
    );

    FunctionRecord {
        name: name.to_string(),
        handler,
        parameter_names,
        parameter_types,
        defaults,
        description,
        return_type: signature.returns,
        is_variadic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        Handler::sync(|_| Ok(()))
    }

    #[test]
    fn collects_names_types_and_defaults_in_order() {
        let sig = Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("label"))
            .param(Param::new("y").typed(ParamType::Int).default(2))
            .doc("add two integers")
            .returns("int");

        let record = inspect("add", sig, noop());

        assert_eq!(record.parameter_names, vec!["x", "label", "y"]);
        assert_eq!(record.parameter_types.len(), 2);
        assert!(!record.parameter_types.contains_key("label"));
        assert_eq!(record.defaults.get("y"), Some(&Value::Int(2)));
        assert!(record.is_optional("y"));
        assert!(!record.is_optional("x"));
        assert_eq!(record.description.as_deref(), Some("add two integers"));
        assert_eq!(record.return_type.as_deref(), Some("int"));
        assert!(!record.is_variadic);
    }

    #[test]
    fn variadic_signature_drops_types_and_appends_markers() {
        let sig = Signature::new()
            .param(Param::new("first").typed(ParamType::Int))
            .variadic(Variadic::Positional("args".into()))
            .variadic(Variadic::Keyword("kwargs".into()));

        let record = inspect("collect", sig, noop());

        assert!(record.is_variadic);
        assert!(record.parameter_types.is_empty());
        assert_eq!(record.parameter_names, vec!["first", "*args", "**kwargs"]);
        assert_eq!(record.declared_params().collect::<Vec<_>>(), vec!["first"]);
        assert_eq!(
            record.variadic_markers().collect::<Vec<_>>(),
            vec!["*args", "**kwargs"]
        );
    }

    #[test]
    fn blank_docstring_becomes_generated_help() {
        let record = inspect("do", Signature::new().doc("   "), noop());
        assert_eq!(record.description, None);
        assert_eq!(record.help(), "execute do function");
    }

    #[test]
    fn signature_line_renders_types_defaults_and_return() {
        let sig = Signature::new()
            .param(Param::new("x").typed(ParamType::Int))
            .param(Param::new("greeting").default("hi"))
            .returns("str");
        let record = inspect("greet", sig, noop());
        assert_eq!(record.signature_line(), r#"greet(x: int, greeting = "hi") -> str"#);
    }
}
