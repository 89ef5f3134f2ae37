//! Client for the Results backend: long-term storage of terminal work.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::client::{check, ClientConfig};
use crate::error::Result;
use crate::retry::retry;

pub struct Results {
    baseurl: String,
    http: reqwest::Client,
}

impl Results {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            baseurl: config.baseurl.trim_end_matches('/').to_string(),
            http: config.build()?,
        })
    }

    pub fn baseurl(&self) -> &str {
        &self.baseurl
    }

    /// Deposit terminal work payloads for retention.
    pub async fn deposit(&self, works: &[Value]) -> Result<bool> {
        retry(|| async move {
            let response = self
                .http
                .post(format!("{}/deposit", self.baseurl))
                .json(works)
                .send()
                .await?;
            check(response).await?;
            Ok(true)
        })
        .await
    }

    pub async fn view(&self, query: Value) -> Result<Vec<Value>> {
        let response = self
            .http
            .post(format!("{}/view", self.baseurl))
            .json(&json!({"query": query}))
            .send()
            .await?;
        let works: Vec<Value> = check(response).await?.json().await?;
        Ok(works)
    }

    /// Whether a result row with this pipeline and id is already present.
    pub async fn exists(&self, pipeline: &str, id: &str) -> Result<bool> {
        let rows = self
            .view(json!({"pipeline": pipeline, "id": id}))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Retained-work counts by pipeline.
    pub async fn status(&self) -> Result<HashMap<String, u64>> {
        let response = self
            .http
            .get(format!("{}/status", self.baseurl))
            .send()
            .await?;
        let counts: HashMap<String, u64> = check(response).await?.json().await?;
        Ok(counts)
    }

    pub async fn info(&self) -> Result<HashMap<String, Value>> {
        let response = self
            .http
            .get(format!("{}/version", self.baseurl))
            .send()
            .await?;
        let server: Value = check(response).await?.json().await?;
        Ok(HashMap::from([
            ("client".to_string(), json!(env!("CARGO_PKG_VERSION"))),
            ("server".to_string(), server),
        ]))
    }
}
