//! Retry combinator for mutating backend calls: jittered waits under an
//! overall deadline, re-raising the last error when the deadline elapses.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::warn;

use crate::error::Result;

const DEADLINE: Duration = Duration::from_secs(30);
const JITTER_MIN_MS: u64 = 500;
const JITTER_MAX_MS: u64 = 1500;

/// Run `op` until it succeeds, fails non-transiently, or the 30 s deadline
/// elapses. Waits a random 0.5-1.5 s between tries.
pub async fn retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + DEADLINE;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                let wait =
                    Duration::from_millis(rand::rng().random_range(JITTER_MIN_MS..=JITTER_MAX_MS));
                if Instant::now() + wait >= deadline {
                    return Err(err);
                }
                warn!(error = %err, "transient backend error, retrying");
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}
