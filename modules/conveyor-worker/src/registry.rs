//! Handler registry: the worker's table of callables keyed by dotted path.
//! A work's `function` field indexes into this table.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

/// A plain callable invoked with the work's parameters.
pub trait Handler: Send + Sync {
    fn call(&self, parameters: &Map<String, Value>) -> anyhow::Result<Value>;
}

impl<F> Handler for F
where
    F: Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync,
{
    fn call(&self, parameters: &Map<String, Value>) -> anyhow::Result<Value> {
        self(parameters)
    }
}

/// A callable with a CLI-command introspection surface: the executor
/// discovers parameter defaults through `params` and invokes through an
/// argv rendered as `--name=value`.
pub trait CliHandler: Send + Sync {
    /// Ordered (name, default) pairs.
    fn params(&self) -> Vec<(String, Value)>;
    fn invoke(&self, argv: &[String]) -> anyhow::Result<Value>;
}

#[derive(Clone)]
pub enum Registered {
    Function(Arc<dyn Handler>),
    Cli(Arc<dyn CliHandler>),
}

#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<String, Registered>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the example arithmetic handlers.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_fn("math.mean", |parameters: &Map<String, Value>| {
            let a = number(parameters, "a")?;
            let b = number(parameters, "b")?;
            Ok(json!({"sum": a + b, "mean": (a + b) / 2.0}))
        });
        registry.register_fn("math.sum", |parameters: &Map<String, Value>| {
            let values = parameters
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow::anyhow!("parameter 'values' must be a list"))?;
            let total: f64 = values.iter().filter_map(Value::as_f64).sum();
            Ok(json!({"sum": total}))
        });
        registry.register_cli("math.arithmetic", Arithmetic);
        registry
    }

    pub fn register_fn<H>(&mut self, path: impl Into<String>, handler: H)
    where
        H: Handler + 'static,
    {
        self.handlers
            .insert(path.into(), Registered::Function(Arc::new(handler)));
    }

    pub fn register_cli<H>(&mut self, path: impl Into<String>, handler: H)
    where
        H: CliHandler + 'static,
    {
        self.handlers
            .insert(path.into(), Registered::Cli(Arc::new(handler)));
    }

    pub fn resolve(&self, path: &str) -> Option<Registered> {
        self.handlers.get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.handlers.contains_key(path)
    }
}

fn number(parameters: &Map<String, Value>, key: &str) -> anyhow::Result<f64> {
    parameters
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow::anyhow!("parameter '{key}' must be a number"))
}

/// Example CLI-style handler with discoverable defaults.
struct Arithmetic;

impl CliHandler for Arithmetic {
    fn params(&self) -> Vec<(String, Value)> {
        vec![
            ("alpha".to_string(), json!(1.0)),
            ("beta".to_string(), json!(1.0)),
        ]
    }

    fn invoke(&self, argv: &[String]) -> anyhow::Result<Value> {
        let mut alpha = 1.0f64;
        let mut beta = 1.0f64;
        for arg in argv {
            if let Some(value) = arg.strip_prefix("--alpha=") {
                alpha = value.parse()?;
            } else if let Some(value) = arg.strip_prefix("--beta=") {
                beta = value.parse()?;
            }
        }
        Ok(json!({
            "sum": alpha + beta,
            "difference": alpha - beta,
            "product": alpha * beta,
            "quotient": alpha / beta,
        }))
    }
}
