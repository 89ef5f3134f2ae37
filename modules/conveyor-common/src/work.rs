//! The unit task descriptor exchanged with the Buckets and Results backends.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::{Notify, WorkConfig};
use crate::error::{ConveyorError, Result};

static PIPELINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Current unix time in fractional seconds.
pub fn now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Site where a work may be performed. Closed set; the workspace file
/// restricts which of these are active for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Chime,
    Kko,
    Gbo,
    Hco,
    Canfar,
    Cedar,
    Aro,
    Local,
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Site::Chime => write!(f, "chime"),
            Site::Kko => write!(f, "kko"),
            Site::Gbo => write!(f, "gbo"),
            Site::Hco => write!(f, "hco"),
            Site::Canfar => write!(f, "canfar"),
            Site::Cedar => write!(f, "cedar"),
            Site::Aro => write!(f, "aro"),
            Site::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for Site {
    type Err = ConveyorError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chime" => Ok(Self::Chime),
            "kko" => Ok(Self::Kko),
            "gbo" => Ok(Self::Gbo),
            "hco" => Ok(Self::Hco),
            "canfar" => Ok(Self::Canfar),
            "cedar" => Ok(Self::Cedar),
            "aro" => Ok(Self::Aro),
            "local" => Ok(Self::Local),
            other => Err(ConveyorError::UnknownSite(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Created,
    Queued,
    Running,
    Success,
    Failure,
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkStatus::Created => write!(f, "created"),
            WorkStatus::Queued => write!(f, "queued"),
            WorkStatus::Running => write!(f, "running"),
            WorkStatus::Success => write!(f, "success"),
            WorkStatus::Failure => write!(f, "failure"),
        }
    }
}

/// One queued task unit: inputs, execution policy, and a growing result
/// surface. Immutable once queued except for the fields the worker owns
/// (`status`, `stop`, `results`, `products`, `plots`). The backend owns
/// `id`, `attempt`, and withdraw-time `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    /// Assigned by the Buckets backend on first deposit.
    #[serde(default)]
    pub id: Option<String>,
    pub pipeline: String,
    pub site: Site,
    pub user: String,
    /// Dotted path into the worker's handler registry. Mutually exclusive
    /// with `command`.
    #[serde(default)]
    pub function: Option<String>,
    /// Argv to run as a subprocess. Mutually exclusive with `function`.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub results: Option<Map<String, Value>>,
    #[serde(default)]
    pub products: Option<Vec<String>>,
    #[serde(default)]
    pub plots: Option<Vec<String>>,
    /// Event IDs the work was performed against.
    #[serde(default)]
    pub event: Option<Vec<i64>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default = "default_status")]
    pub status: WorkStatus,
    #[serde(default)]
    pub creation: Option<f64>,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub stop: Option<f64>,
    #[serde(default)]
    pub config: WorkConfig,
    #[serde(default)]
    pub notify: Notify,
}

fn default_timeout() -> u32 {
    3600
}

fn default_retries() -> u32 {
    2
}

fn default_priority() -> u32 {
    3
}

fn default_status() -> WorkStatus {
    WorkStatus::Created
}

impl Work {
    /// Construct a new work for `pipeline` at `site` on behalf of `user`.
    /// The pipeline name is normalized to hyphen-case; `creation` is
    /// stamped; tags from the `WORKFLOW_TAGS` environment variable are
    /// merged in.
    pub fn new(pipeline: &str, site: Site, user: &str) -> Result<Work> {
        let mut work = Work {
            id: None,
            pipeline: normalize_pipeline(pipeline)?,
            site,
            user: user.to_string(),
            function: None,
            command: None,
            parameters: None,
            results: None,
            products: None,
            plots: None,
            event: None,
            tags: None,
            timeout: default_timeout(),
            retries: default_retries(),
            priority: default_priority(),
            attempt: 0,
            status: WorkStatus::Created,
            creation: Some(now()),
            start: None,
            stop: None,
            config: WorkConfig::default(),
            notify: Notify::default(),
        };
        work.merge_env_tags();
        work.validate()?;
        Ok(work)
    }

    /// Enforce the model invariants. Called on construction and on every
    /// deserialization entry point.
    pub fn validate(&self) -> Result<()> {
        if !PIPELINE_RE.is_match(&self.pipeline) {
            return Err(ConveyorError::InvalidPipeline(self.pipeline.clone()));
        }
        if self.user.is_empty() {
            return Err(ConveyorError::MissingUser);
        }
        if self.function.is_some() && self.command.is_some() {
            return Err(ConveyorError::AmbiguousExecutable);
        }
        if !(1..=86_400).contains(&self.timeout) {
            return Err(ConveyorError::InvalidTimeout(self.timeout as i64));
        }
        if self.retries >= 6 {
            return Err(ConveyorError::InvalidRetries(self.retries));
        }
        if !(1..=5).contains(&self.priority) {
            return Err(ConveyorError::InvalidPriority(self.priority));
        }
        let ordered = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => a <= b,
            _ => true,
        };
        if !ordered(self.creation, self.start) || !ordered(self.start, self.stop) {
            return Err(ConveyorError::InvalidTimestamps);
        }
        Ok(())
    }

    /// Merge comma-separated tags from `WORKFLOW_TAGS`, deduplicated.
    fn merge_env_tags(&mut self) {
        let Ok(raw) = std::env::var("WORKFLOW_TAGS") else {
            return;
        };
        let mut tags = self.tags.take().unwrap_or_default();
        for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_string());
            }
        }
        if !tags.is_empty() {
            self.tags = Some(tags);
        }
    }

    /// The wire representation sent to the backends.
    pub fn payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Work> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Build a work from a wire payload, enforcing invariants. The legacy
    /// flat `archive` boolean is dropped with a warning; `config.archive`
    /// is the only supported form.
    pub fn from_value(mut value: Value) -> Result<Work> {
        if let Some(object) = value.as_object_mut() {
            if let Some(legacy) = object.remove("archive") {
                warn!(
                    value = %legacy,
                    "deprecated flat 'archive' field ignored, use config.archive"
                );
            }
        }
        let work: Work = serde_json::from_value(value)?;
        work.validate()?;
        Ok(work)
    }

    /// True once the work carries something to execute.
    pub fn has_executable(&self) -> bool {
        self.function.is_some() || self.command.is_some()
    }
}

fn normalize_pipeline(pipeline: &str) -> Result<String> {
    let normalized = pipeline.to_lowercase().replace([' ', '_'], "-");
    if !PIPELINE_RE.is_match(&normalized) {
        return Err(ConveyorError::InvalidPipeline(pipeline.to_string()));
    }
    if normalized != pipeline {
        warn!(original = pipeline, reformatted = %normalized, "pipeline reformatted");
    }
    Ok(normalized)
}
