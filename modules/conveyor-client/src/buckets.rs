//! Client for the Buckets backend: the central queue of pending work.

use std::collections::HashMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use conveyor_common::Work;

use crate::client::{check, ClientConfig};
use crate::error::Result;
use crate::retry::retry;

/// Filter for withdrawing queued work. Empty fields are omitted from the
/// wire query, which is composed additively.
#[derive(Debug, Clone, Default)]
pub struct WithdrawFilter {
    pub pipeline: String,
    pub site: Option<String>,
    pub priority: Option<u32>,
    pub user: Option<String>,
    pub event: Option<Vec<i64>>,
    pub tags: Option<Vec<String>>,
    pub parent: Option<String>,
}

impl WithdrawFilter {
    pub fn pipeline(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            ..Self::default()
        }
    }

    fn query(&self) -> Value {
        let mut query = Map::new();
        query.insert("pipeline".into(), json!(self.pipeline));
        if let Some(site) = &self.site {
            query.insert("site".into(), json!(site));
        }
        if let Some(priority) = self.priority {
            query.insert("priority".into(), json!(priority));
        }
        if let Some(user) = &self.user {
            query.insert("user".into(), json!(user));
        }
        if let Some(event) = &self.event {
            if !event.is_empty() {
                query.insert("event".into(), json!({"$in": event}));
            }
        }
        if let Some(tags) = &self.tags {
            if !tags.is_empty() {
                query.insert("tags".into(), json!({"$in": tags}));
            }
        }
        if let Some(parent) = &self.parent {
            query.insert("config.parent".into(), json!(parent));
        }
        Value::Object(query)
    }
}

/// Counters returned by the server-side audit sweeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCounts {
    pub failed: u64,
    pub expired: u64,
    pub stale: u64,
}

pub struct Buckets {
    baseurl: String,
    http: reqwest::Client,
}

impl Buckets {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            baseurl: config.baseurl.trim_end_matches('/').to_string(),
            http: config.build()?,
        })
    }

    pub fn baseurl(&self) -> &str {
        &self.baseurl
    }

    /// Deposit works into the queue. Returns true on success.
    pub async fn deposit(&self, works: &[Work]) -> Result<bool> {
        retry(|| async move {
            let response = self
                .http
                .post(format!("{}/work?return_ids=false", self.baseurl))
                .json(works)
                .send()
                .await?;
            check(response).await?;
            Ok(true)
        })
        .await
    }

    /// Deposit works and return the ids the backend assigned.
    pub async fn deposit_with_ids(&self, works: &[Work]) -> Result<Vec<String>> {
        retry(|| async move {
            let response = self
                .http
                .post(format!("{}/work?return_ids=true", self.baseurl))
                .json(works)
                .send()
                .await?;
            let ids: Vec<String> = check(response).await?.json().await?;
            Ok(ids)
        })
        .await
    }

    /// Atomically dequeue one queued work matching the filter. The backend
    /// marks the row running, stamps `start`, and increments `attempt` in
    /// the same transaction. None means the queue is empty for the filter.
    pub async fn withdraw(&self, filter: &WithdrawFilter) -> Result<Option<Work>> {
        let response = self
            .http
            .post(format!("{}/work/withdraw", self.baseurl))
            .json(&filter.query())
            .send()
            .await?;
        let payload: Value = check(response).await?.json().await?;
        if payload.is_null() {
            return Ok(None);
        }
        let work = Work::from_value(payload)
            .map_err(|err| crate::error::ClientError::Parse(err.to_string()))?;
        Ok(Some(work))
    }

    /// Persist worker-side mutations of the given works.
    pub async fn update(&self, works: &[Work]) -> Result<bool> {
        retry(|| async move {
            let response = self
                .http
                .put(format!("{}/work", self.baseurl))
                .json(works)
                .send()
                .await?;
            let updated: bool = check(response).await?.json().await?;
            Ok(updated)
        })
        .await
    }

    pub async fn delete_ids(&self, ids: &[String]) -> Result<bool> {
        retry(|| async move {
            let query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
            let response = self
                .http
                .delete(format!("{}/work", self.baseurl))
                .query(&query)
                .send()
                .await?;
            let deleted: bool = check(response).await?.json().await?;
            Ok(deleted)
        })
        .await
    }

    /// Bulk delete by pipeline, optionally narrowed by status and events.
    /// Lists the matching ids first and requires operator confirmation
    /// unless `force` is set; silent bulk delete is forbidden.
    pub async fn delete_many(
        &self,
        pipeline: &str,
        status: Option<&str>,
        events: Option<&[i64]>,
        force: bool,
    ) -> Result<bool> {
        let mut query = Map::new();
        query.insert("pipeline".into(), json!(pipeline));
        if let Some(status) = status {
            query.insert("status".into(), json!(status));
        }
        if let Some(events) = events {
            query.insert("event".into(), json!({"$in": events}));
        }
        let matches = self
            .view(Value::Object(query), json!({"id": true}), 0, None)
            .await?;
        let ids: Vec<String> = matches
            .iter()
            .filter_map(|work| work.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(false);
        }
        if !force && !confirm_delete(pipeline, ids.len(), status, events) {
            info!("bulk delete aborted by operator");
            return Ok(false);
        }
        self.delete_ids(&ids).await
    }

    /// Query works; the projection is applied server-side and `_id` is
    /// always suppressed.
    pub async fn view(
        &self,
        query: Value,
        projection: Value,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        let mut projection = match projection {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        projection.insert("_id".into(), json!(false));
        let payload = json!({
            "query": query,
            "projection": projection,
            "skip": skip,
            "limit": limit,
        });
        let response = self
            .http
            .post(format!("{}/view", self.baseurl))
            .json(&payload)
            .send()
            .await?;
        let works: Vec<Value> = check(response).await?.json().await?;
        Ok(works)
    }

    /// Run the three server-side sweeps in fixed order: retry failed work,
    /// expire running work past its deadline, fail stale work older than
    /// seven days.
    pub async fn audit(&self) -> Result<AuditCounts> {
        retry(|| async move {
            let mut counts = AuditCounts::default();
            for (sweep, route) in [
                ("failed", "/audit/failed"),
                ("expired", "/audit/expired"),
                ("stale", "/audit/stale/7.0"),
            ] {
                let response = self
                    .http
                    .get(format!("{}{route}", self.baseurl))
                    .send()
                    .await?;
                let count: u64 = check(response).await?.json().await?;
                debug!(sweep, count, "audit sweep complete");
                match sweep {
                    "failed" => counts.failed = count,
                    "expired" => counts.expired = count,
                    _ => counts.stale = count,
                }
            }
            Ok(counts)
        })
        .await
    }

    /// Queue depth by pipeline, or details for one pipeline.
    pub async fn status(&self, pipeline: Option<&str>) -> Result<Value> {
        let url = match pipeline {
            Some(pipeline) => format!("{}/status/details/{pipeline}", self.baseurl),
            None => format!("{}/status", self.baseurl),
        };
        let response = self.http.get(url).send().await?;
        let status: Value = check(response).await?.json().await?;
        Ok(status)
    }

    /// Names of the pipelines currently present in the queue.
    pub async fn pipelines(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/status/pipelines", self.baseurl))
            .send()
            .await?;
        let pipelines: Vec<String> = check(response).await?.json().await?;
        Ok(pipelines)
    }

    /// Client and server version information.
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

fn confirm_delete(
    pipeline: &str,
    count: usize,
    status: Option<&str>,
    events: Option<&[i64]>,
) -> bool {
    eprintln!("WARNING: this action cannot be undone.");
    eprintln!("About to delete work from bucket: {pipeline}");
    eprintln!("  status: {}", status.unwrap_or("any"));
    match events {
        Some(events) => eprintln!("  events: {events:?}"),
        None => eprintln!("  events: any"),
    }
    eprintln!("  count : {count}");
    eprint!("Are you sure? (y/n) ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        warn!("could not read confirmation, aborting delete");
        return false;
    }
    answer.trim().eq_ignore_ascii_case("y")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdraw_query_is_additive() {
        let filter = WithdrawFilter::pipeline("demo");
        assert_eq!(filter.query(), json!({"pipeline": "demo"}));

        let filter = WithdrawFilter {
            pipeline: "demo".into(),
            site: Some("chime".into()),
            event: Some(vec![1, 2]),
            tags: Some(vec!["nightly".into()]),
            parent: Some("parent-id".into()),
            ..WithdrawFilter::default()
        };
        assert_eq!(
            filter.query(),
            json!({
                "pipeline": "demo",
                "site": "chime",
                "event": {"$in": [1, 2]},
                "tags": {"$in": ["nightly"]},
                "config.parent": "parent-id",
            })
        );
    }

    #[test]
    fn empty_event_and_tag_lists_are_omitted() {
        let filter = WithdrawFilter {
            pipeline: "demo".into(),
            event: Some(vec![]),
            tags: Some(vec![]),
            ..WithdrawFilter::default()
        };
        assert_eq!(filter.query(), json!({"pipeline": "demo"}));
    }
}
