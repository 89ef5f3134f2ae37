//! Transfer daemon: promotes terminal work from Buckets into the Results
//! store and purges what the archive policy excludes. The contract is that
//! no id is deleted from Buckets before it is durably present in Results,
//! or confirmed already present there.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use conveyor_client::{Buckets, Results};
use conveyor_common::{now, Workspace};

/// Seven days: both the stale-work horizon and the failed-work lookback.
pub const DEFAULT_CUTOFF: Duration = Duration::from_secs(60 * 60 * 24 * 7);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    pub transfered: u64,
    pub deleted: u64,
}

/// One reconciliation pass over the queue.
pub async fn tick(
    buckets: &Buckets,
    results: &Results,
    workspace: &Workspace,
    limit: u64,
    cutoff: Duration,
) -> anyhow::Result<TransferOutcome> {
    let archive_allowed = workspace.config.archive.results;
    let horizon = now() - cutoff.as_secs_f64();
    let mut transfer: Vec<String> = Vec::new();
    let mut delete: Vec<String> = Vec::new();

    // Successful work: retained or purged per its archive policy.
    let successful = buckets
        .view(
            json!({"status": "success"}),
            json!({"id": true, "config": true}),
            0,
            Some(limit),
        )
        .await?;
    partition(&successful, archive_allowed, &mut transfer, &mut delete);

    // Failed work that the audit daemon will no longer requeue.
    let exhausted = buckets
        .view(
            json!({
                "status": "failure",
                "$expr": {"$gte": ["$attempt", "$retries"]},
                "creation": {"$gt": horizon},
            }),
            json!({"id": true, "config": true}),
            0,
            Some(limit),
        )
        .await?;
    partition(&exhausted, archive_allowed, &mut transfer, &mut delete);

    // Anything older than the horizon is purged outright.
    let stale = buckets
        .view(
            json!({"creation": {"$lt": horizon}}),
            json!({"id": true}),
            0,
            Some(limit),
        )
        .await?;
    for row in &stale {
        if let Some(id) = row_id(row) {
            delete.push(id);
        }
    }
    debug!(
        transfer = transfer.len(),
        delete = delete.len(),
        "queue partitioned"
    );

    let mut transfered = 0u64;
    if !transfer.is_empty() {
        let payload = buckets
            .view(
                json!({"id": {"$in": transfer}}),
                json!({}),
                0,
                Some(limit * 2),
            )
            .await?;
        match results.deposit(&payload).await {
            Ok(_) => {
                transfered = payload.len() as u64;
                delete.extend(transfer.iter().cloned());
                info!(count = transfered, "transferred works to results");
            }
            Err(err) => {
                warn!(error = %err, "bulk transfer failed, checking per-id");
                transfered = salvage(results, &payload, &mut delete).await;
            }
        }
    }

    delete.sort();
    delete.dedup();
    if !delete.is_empty() {
        buckets.delete_ids(&delete).await?;
        info!(count = delete.len(), "deleted works from buckets");
    }
    Ok(TransferOutcome {
        transfered,
        deleted: delete.len() as u64,
    })
}

/// Recover from a partial deposit: ids already present in Results are
/// queued for delete; the still-missing subset is redeposited. Ids that
/// could not be confirmed durable stay in Buckets for the next tick.
async fn salvage(results: &Results, payload: &[Value], delete: &mut Vec<String>) -> u64 {
    let mut missing: Vec<Value> = Vec::new();
    for row in payload {
        let (Some(id), Some(pipeline)) = (
            row_id(row),
            row.get("pipeline").and_then(Value::as_str),
        ) else {
            continue;
        };
        match results.exists(pipeline, &id).await {
            Ok(true) => {
                debug!(id = %id, "work already present in results");
                delete.push(id);
            }
            Ok(false) => missing.push(row.clone()),
            Err(err) => warn!(id = %id, error = %err, "existence check failed, keeping in buckets"),
        }
    }
    if missing.is_empty() {
        return 0;
    }
    match results.deposit(&missing).await {
        Ok(_) => {
            let ids = missing.iter().filter_map(row_id);
            delete.extend(ids);
            missing.len() as u64
        }
        Err(err) => {
            warn!(error = %err, "redeposit failed, works stay in buckets");
            0
        }
    }
}

/// Route a partial work row by its archive policy.
fn partition(
    rows: &[Value],
    archive_allowed: bool,
    transfer: &mut Vec<String>,
    delete: &mut Vec<String>,
) {
    for row in rows {
        let Some(id) = row_id(row) else {
            continue;
        };
        let keep_results = row
            .pointer("/config/archive/results")
            .and_then(Value::as_bool);
        match keep_results {
            Some(true) if archive_allowed => transfer.push(id),
            _ => delete.push(id),
        }
    }
}

fn row_id(row: &Value) -> Option<String> {
    row.get("id").and_then(Value::as_str).map(str::to_string)
}

/// Loop until interrupted, log-and-continue on errors.
pub async fn run(
    buckets: &Buckets,
    results: &Results,
    workspace: &Workspace,
    limit: u64,
    cutoff: Duration,
    sleep: Duration,
) {
    loop {
        match tick(buckets, results, workspace, limit, cutoff).await {
            Ok(outcome) => info!(
                transfered = outcome.transfered,
                deleted = outcome.deleted,
                "transfer pass complete"
            ),
            Err(err) => error!(error = %err, "transfer pass failed"),
        }
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }
}
