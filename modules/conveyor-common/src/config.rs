//! Per-work configuration: archival policy, lineage, and notification targets.

use serde::{Deserialize, Serialize};

/// Strategy applied to one artifact kind when a work is archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveMethod {
    Bypass,
    Copy,
    Move,
    Delete,
    Upload,
}

impl std::fmt::Display for ArchiveMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveMethod::Bypass => write!(f, "bypass"),
            ArchiveMethod::Copy => write!(f, "copy"),
            ArchiveMethod::Move => write!(f, "move"),
            ArchiveMethod::Delete => write!(f, "delete"),
            ArchiveMethod::Upload => write!(f, "upload"),
        }
    }
}

impl std::str::FromStr for ArchiveMethod {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bypass" => Ok(Self::Bypass),
            "copy" => Ok(Self::Copy),
            "move" => Ok(Self::Move),
            "delete" => Ok(Self::Delete),
            "upload" => Ok(Self::Upload),
            other => Err(format!("unknown ArchiveMethod: {other}")),
        }
    }
}

/// Archival policy for the work's result surface and file artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Whether the results mapping is transferred to long-term storage.
    pub results: bool,
    pub products: ArchiveMethod,
    pub plots: ArchiveMethod,
    pub logs: ArchiveMethod,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            results: true,
            products: ArchiveMethod::Copy,
            plots: ArchiveMethod::Copy,
            logs: ArchiveMethod::Move,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    pub archive: ArchiveConfig,
    /// ID of the parent pipeline, when this work was fanned out by another.
    pub parent: Option<String>,
    pub orgs: Vec<String>,
    pub teams: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackNotify {
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notify {
    pub slack: SlackNotify,
}

impl Notify {
    /// True when any notification channel is configured for the work.
    pub fn is_configured(&self) -> bool {
        self.slack.channel_id.is_some()
    }
}
