//! Client for the Pipelines backend. Collaborator only: the core consumes
//! a minimal CRUD surface for pipeline descriptors.

use serde_json::{json, Value};

use crate::client::{check, ClientConfig};
use crate::error::Result;
use crate::retry::retry;

pub struct Pipelines {
    baseurl: String,
    http: reqwest::Client,
}

impl Pipelines {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            baseurl: config.baseurl.trim_end_matches('/').to_string(),
            http: config.build()?,
        })
    }

    pub fn baseurl(&self) -> &str {
        &self.baseurl
    }

    /// Deploy a pipeline descriptor; returns the ids generated.
    pub async fn deploy(&self, payload: &Value) -> Result<Vec<String>> {
        retry(|| async move {
            let response = self
                .http
                .post(format!("{}/v2/pipelines", self.baseurl))
                .json(payload)
                .send()
                .await?;
            let ids: Vec<String> = check(response).await?.json().await?;
            Ok(ids)
        })
        .await
    }

    pub async fn list(&self, name: Option<&str>) -> Result<Vec<Value>> {
        let mut request = self.http.get(format!("{}/v2/pipelines", self.baseurl));
        if let Some(name) = name {
            request = request.query(&[("name", name)]);
        }
        let response = request.send().await?;
        let pipelines: Vec<Value> = check(response).await?.json().await?;
        Ok(pipelines)
    }

    pub async fn get(&self, name: &str, id: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/v2/pipelines/{name}/{id}", self.baseurl))
            .send()
            .await?;
        let pipeline: Value = check(response).await?.json().await?;
        Ok(pipeline)
    }

    pub async fn remove(&self, name: &str, id: &str) -> Result<bool> {
        retry(|| async move {
            let response = self
                .http
                .delete(format!("{}/v2/pipelines/{name}/{id}", self.baseurl))
                .send()
                .await?;
            check(response).await?;
            Ok(true)
        })
        .await
    }

    pub async fn info(&self) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/version", self.baseurl))
            .send()
            .await?;
        let server: Value = check(response).await?.json().await?;
        Ok(json!({
            "client": env!("CARGO_PKG_VERSION"),
            "server": server,
        }))
    }
}
