//! Pre-flight and post-execution checks: handler resolution, command
//! availability, outcome shape, and the results size cap.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use conveyor_common::Work;

use crate::error::WorkerError;
use crate::registry::{Registered, Registry};

/// Serialized results larger than this are discarded, not shipped.
pub const MAX_RESULTS_BYTES: usize = 4 * 1024 * 1024;

/// Resolve a dotted function path against the registry.
pub fn function(registry: &Registry, path: &str) -> Result<Registered, WorkerError> {
    registry
        .resolve(path)
        .inspect(|_| debug!(path, "resolved handler"))
        .ok_or_else(|| WorkerError::Resolution(path.to_string()))
}

/// Whether the executable is present on the host PATH.
pub fn command(arg0: &str) -> bool {
    match which::which(arg0) {
        Ok(found) => {
            debug!(command = arg0, path = %found.display(), "discovered command");
            true
        }
        Err(_) => false,
    }
}

/// Normalized execution outcome.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub results: Option<Map<String, Value>>,
    pub products: Option<Vec<String>>,
    pub plots: Option<Vec<String>>,
}

/// Accepts a mapping (interpreted as results), a three-element
/// `[mapping, list, list]`, or null. Anything else is logged and discarded.
pub fn outcome(value: Value) -> Outcome {
    match value {
        Value::Null => Outcome::default(),
        Value::Object(results) => Outcome {
            results: Some(results),
            ..Outcome::default()
        },
        Value::Array(entries) => match <[Value; 3]>::try_from(entries) {
            Ok([Value::Object(results), products, plots]) => {
                match (paths(products), paths(plots)) {
                    (Some(products), Some(plots)) => Outcome {
                        results: Some(results),
                        products: Some(products),
                        plots: Some(plots),
                    },
                    _ => {
                        warn!("discarding malformed outcome triple");
                        Outcome::default()
                    }
                }
            }
            _ => {
                warn!("discarding malformed outcome triple");
                Outcome::default()
            }
        },
        other => {
            warn!(outcome = %other, "discarding unrecognized outcome shape");
            Outcome::default()
        }
    }
}

fn paths(value: Value) -> Option<Vec<String>> {
    let Value::Array(entries) = value else {
        return None;
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(path) => Some(path),
            _ => None,
        })
        .collect()
}

/// Enforce the results size cap. Oversized results are cleared with an
/// error log; the work itself never fails for this.
pub fn size(work: &mut Work) {
    let Some(results) = &work.results else {
        return;
    };
    let serialized = serde_json::to_vec(results).map(|b| b.len()).unwrap_or(0);
    if serialized > MAX_RESULTS_BYTES {
        error!(
            bytes = serialized,
            limit = MAX_RESULTS_BYTES,
            "results exceed the size cap, discarding"
        );
        work.results = None;
    }
}
