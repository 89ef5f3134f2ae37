//! Memoized clients for the three backend services, bound to the
//! workspace baseurls.

use conveyor_common::Workspace;

use crate::buckets::Buckets;
use crate::client::ClientConfig;
use crate::error::{ClientError, Result};
use crate::pipelines::Pipelines;
use crate::results::Results;

pub const DEFAULT_BUCKETS_BASEURL: &str = "http://localhost:8004";

pub struct HttpContext {
    pub buckets: Buckets,
    pub results: Option<Results>,
    pub pipelines: Option<Pipelines>,
}

impl HttpContext {
    /// Build clients from the workspace baseurls. Buckets falls back to the
    /// local default; Results and Pipelines are only constructed when the
    /// workspace declares them.
    pub fn new(workspace: &Workspace, token: Option<String>) -> Result<Self> {
        let auth = workspace.auth.clone();
        let config = |baseurl: &str| {
            let mut config = ClientConfig::new(baseurl).with_auth(auth.clone());
            if let Some(token) = &token {
                config = config.with_token(token.clone());
            }
            config
        };
        let buckets_url = workspace
            .baseurl("buckets")
            .unwrap_or(DEFAULT_BUCKETS_BASEURL);
        let buckets = Buckets::new(&config(buckets_url))?;
        let results = workspace
            .baseurl("results")
            .map(|url| Results::new(&config(url)))
            .transpose()?;
        let pipelines = workspace
            .baseurl("pipelines")
            .map(|url| Pipelines::new(&config(url)))
            .transpose()?;
        Ok(Self {
            buckets,
            results,
            pipelines,
        })
    }

    /// The Results client, when the workspace declares a results baseurl.
    pub fn results(&self) -> Result<&Results> {
        self.results
            .as_ref()
            .ok_or_else(|| ClientError::Config("no results baseurl in workspace".into()))
    }
}
