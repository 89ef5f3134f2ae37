//! Audit daemon: drives the server-side sweeps that make the queue
//! self-healing. Retry decisions live here, not in the worker.

use std::time::Duration;

use tracing::{error, info};

use conveyor_client::{AuditCounts, Buckets};

/// One audit pass: retry failed work with attempts remaining, expire
/// running work past its deadline, fail stale work older than seven days.
pub async fn tick(buckets: &Buckets) -> conveyor_client::Result<AuditCounts> {
    let counts = buckets.audit().await?;
    info!(
        failed = counts.failed,
        expired = counts.expired,
        stale = counts.stale,
        "audit sweep complete"
    );
    Ok(counts)
}

/// Loop until interrupted, log-and-continue on errors.
pub async fn run(buckets: &Buckets, sleep: Duration) {
    loop {
        if let Err(err) = tick(buckets).await {
            error!(error = %err, "audit sweep failed");
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
