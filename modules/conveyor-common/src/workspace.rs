//! Deployment workspace: service baseurls, archive mounts, and site policy.
//! Loaded once per process from a YAML file and passed by value into the
//! archiver and the HTTP context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ArchiveMethod;
use crate::error::{ConveyorError, Result};

/// Storage backend an artifact kind is archived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    Posix,
    S3,
    Http,
}

impl std::fmt::Display for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Storage::Posix => write!(f, "posix"),
            Storage::S3 => write!(f, "s3"),
            Storage::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseUrls {
    pub buckets: Option<String>,
    pub results: Option<String>,
    pub pipelines: Option<String>,
    pub loki: Option<String>,
    pub products: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub baseurls: BaseUrls,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveMounts {
    /// Site name to archive root path.
    pub mounts: HashMap<String, PathBuf>,
}

/// Allowed methods and backing storage for one artifact kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPolicy {
    pub methods: Vec<ArchiveMethod>,
    pub storage: Option<Storage>,
}

impl ArtifactPolicy {
    pub fn allows(&self, method: ArchiveMethod) -> bool {
        self.methods.contains(&method)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceArchivePolicy {
    pub products: ArtifactPolicy,
    pub plots: ArtifactPolicy,
    /// Whether terminal works may be promoted into the Results store.
    pub results: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub archive: WorkspaceArchivePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub provider: String,
}

impl AuthConfig {
    /// Token auth via GitHub is the only scheme the clients emit headers for.
    pub fn is_github_token(&self) -> bool {
        self.kind == "token" && self.provider == "github"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub loki: Option<LokiConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub workspace: String,
    pub sites: Vec<String>,
    pub http: HttpConfig,
    pub archive: ArchiveMounts,
    pub config: WorkspaceConfig,
    pub auth: Option<AuthConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Workspace {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Workspace> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ConveyorError::Workspace(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Workspace> {
        let workspace: Workspace = serde_yaml::from_str(raw)?;
        Ok(workspace)
    }

    /// Archive root for a site, when one is mounted.
    pub fn mount(&self, site: &str) -> Option<&PathBuf> {
        self.archive.mounts.get(site)
    }

    pub fn baseurl(&self, service: &str) -> Option<&str> {
        let urls = &self.http.baseurls;
        match service {
            "buckets" => urls.buckets.as_deref(),
            "results" => urls.results.as_deref(),
            "pipelines" => urls.pipelines.as_deref(),
            "loki" => urls.loki.as_deref(),
            "products" => urls.products.as_deref(),
            _ => None,
        }
    }
}
