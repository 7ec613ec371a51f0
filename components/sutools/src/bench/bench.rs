//! Per-call samples collected by wrapping handlers, reported as JSON.

// Local crates
use crate::registry::models::{Args, FunctionRecord, Handler, HandlerResult, Value};

// External crates
use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shape of one argument or result: a length for strings and sequences, the
/// value itself for scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Summary {
    /// A list, tuple or mapping: only its length is kept.
    Sequence {
        /// Type name.
        #[serde(rename = "type")]
        kind: String,
        /// Number of elements.
        length: usize,
    },
    /// Anything else, kept verbatim.
    Scalar {
        /// Type name.
        #[serde(rename = "type")]
        kind: String,
        /// The value, `None` for unit results.
        value: Option<Value>,
    },
}

impl Summary {
    /// Summary of a declared argument value.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Str(s) => Self::sequence("str", s.chars().count()),
            other => Self::Scalar {
                kind: other.kind().to_string(),
                value: Some(other.clone()),
            },
        }
    }

    /// Summary of a raw variadic token.
    pub fn of_token(token: &str) -> Self {
        Self::sequence("str", token.chars().count())
    }

    fn of_output(output: Option<&str>) -> Self {
        match output {
            Some(s) => Self::of_token(s),
            None => Self::Scalar {
                kind: "none".to_string(),
                value: None,
            },
        }
    }

    fn sequence(kind: &str, length: usize) -> Self {
        Self::Sequence {
            kind: kind.to_string(),
            length,
        }
    }
}

/// One timed call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchSample {
    /// Wall time of the call.
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// Declared argument values followed by leftover positional tokens.
    pub args: Vec<Summary>,
    /// Keyword arguments by name.
    pub keywords: BTreeMap<String, Summary>,
    /// Summary of what the command returned.
    pub result: Summary,
}

fn as_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Records timing samples for wrapped commands, keyed by command name.
///
/// Clones share the same report. Calls that return an error are not
/// recorded.
#[derive(Debug, Clone, Default)]
pub struct Bench {
    report: Arc<Mutex<BTreeMap<String, Vec<BenchSample>>>>,
}

impl Bench {
    /// An empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `record` with its handler replaced by a timing wrapper. Sync
    /// and async handlers keep their kind.
    pub fn wrap(&self, mut record: FunctionRecord) -> FunctionRecord {
        let bench = self.clone();
        let name = record.name.clone();

        record.handler = match record.handler {
            Handler::Sync(f) => Handler::Sync(Arc::new(move |args: &Args| {
                let summary = summarize_args(args);
                let start = Instant::now();
                let result = f(args);
                bench.record(&name, start.elapsed(), summary, &result);
                result
            })),
            Handler::Async(f) => Handler::Async(Arc::new(move |args: Args| {
                let f = Arc::clone(&f);
                let bench = bench.clone();
                let name = name.clone();
                Box::pin(async move {
                    let summary = summarize_args(&args);
                    let start = Instant::now();
                    let result = f(args).await;
                    bench.record(&name, start.elapsed(), summary, &result);
                    result
                }) as BoxFuture<'static, HandlerResult>
            })),
        };
        record
    }

    fn record(
        &self,
        name: &str,
        elapsed: Duration,
        (args, keywords): (Vec<Summary>, BTreeMap<String, Summary>),
        result: &HandlerResult,
    ) {
        let Ok(output) = result else {
            return;
        };
        let sample = BenchSample {
            elapsed,
            args,
            keywords,
            result: Summary::of_output(output.as_deref()),
        };
        tracing::debug!(command = name, elapsed_ms = elapsed.as_millis() as u64, "Recorded bench sample");

        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push(sample);
    }

    /// Snapshot of every sample recorded so far.
    pub fn report(&self) -> BTreeMap<String, Vec<BenchSample>> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Samples recorded for one command, oldest first.
    pub fn samples(&self, command: &str) -> Vec<BenchSample> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .cloned()
            .unwrap_or_default()
    }

    /// Whole report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.report())
    }
}

fn summarize_args(args: &Args) -> (Vec<Summary>, BTreeMap<String, Summary>) {
    let mut positional: Vec<Summary> = args.values().map(|(_, v)| Summary::of_value(v)).collect();
    positional.extend(args.positional().iter().map(|t| Summary::of_token(t)));

    let keywords = args
        .keywords()
        .iter()
        .map(|(k, v)| (k.clone(), Summary::of_token(v)))
        .collect();

    (positional, keywords)
}
