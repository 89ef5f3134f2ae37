//! Archival of work artifacts: applies the per-kind strategy declared on
//! the work through the storage backend declared by the workspace, and
//! rewrites the work's artifact paths to their archived locations.
//!
//! Archiver failures never fail the work: a work that produced correct
//! results is not marked failed because its artifacts could not be copied.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use tracing::warn;

use conveyor_common::workspace::ArtifactPolicy;
use conveyor_common::{now, ArchiveMethod, Storage, Work, Workspace};

pub mod error;
pub mod http;
pub mod posix;
pub mod s3;

pub use error::{ArchiveError, Result};

/// A storage backend able to materialize artifacts under a destination
/// prefix. Implementations update each payload entry to its new location.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    async fn apply(
        &self,
        method: ArchiveMethod,
        dest: &Path,
        items: &mut Vec<String>,
    ) -> Result<()>;

    async fn permissions(&self, dest: &Path, site: &str) -> Result<()>;
}

fn driver(storage: Storage) -> Result<Box<dyn StorageDriver>> {
    match storage {
        Storage::Posix => Ok(Box::new(posix::PosixDriver)),
        Storage::S3 => Ok(Box::new(s3::S3Driver::from_env()?)),
        Storage::Http => Ok(Box::new(http::HttpDriver)),
    }
}

/// Archive destination for a work:
/// `<mount(site)>/workflow/YYYYMMDD/<pipeline>/<id>`, with the date taken
/// from `creation` in local time.
pub fn destination(work: &Work, workspace: &Workspace) -> Option<PathBuf> {
    let mount = workspace.mount(&work.site.to_string())?;
    let id = work.id.as_deref()?;
    let creation = work.creation.unwrap_or_else(now);
    let date = Local
        .timestamp_opt(creation as i64, 0)
        .single()?
        .format("%Y%m%d")
        .to_string();
    Some(
        mount
            .join("workflow")
            .join(date)
            .join(&work.pipeline)
            .join(id),
    )
}

/// Run the archive lifecycle for one work, rewriting its artifact paths.
pub async fn run(work: &mut Work, workspace: &Workspace) {
    let has_artifacts = work.products.as_ref().is_some_and(|p| !p.is_empty())
        || work.plots.as_ref().is_some_and(|p| !p.is_empty());
    if !has_artifacts {
        return;
    }
    let Some(dest) = destination(work, workspace) else {
        warn!(
            site = %work.site,
            id = work.id.as_deref().unwrap_or("unassigned"),
            "no archive destination for work, skipping"
        );
        return;
    };
    let site = work.site.to_string();
    let policy = &workspace.config.archive;

    let mut touched_posix = false;
    touched_posix |= apply_kind(
        "products",
        work.config.archive.products,
        &policy.products,
        &dest,
        &mut work.products,
    )
    .await;
    touched_posix |= apply_kind(
        "plots",
        work.config.archive.plots,
        &policy.plots,
        &dest,
        &mut work.plots,
    )
    .await;

    if touched_posix {
        if let Err(err) = posix::PosixDriver.permissions(&dest, &site).await {
            warn!(error = %err, dest = %dest.display(), "could not set archive permissions");
        }
    }
}

/// Apply one artifact kind's strategy. Returns true when the posix driver
/// mutated the destination (permissions then need fixing up).
async fn apply_kind(
    kind: &str,
    method: ArchiveMethod,
    policy: &ArtifactPolicy,
    dest: &Path,
    items: &mut Option<Vec<String>>,
) -> bool {
    let Some(list) = items.as_mut() else {
        return false;
    };
    if list.is_empty() {
        return false;
    }
    if !policy.allows(method) {
        warn!(kind, method = %method, "archive method not allowed by workspace");
        return false;
    }
    let Some(storage) = policy.storage else {
        warn!(kind, "no archive storage configured in workspace");
        return false;
    };
    let driver = match driver(storage) {
        Ok(driver) => driver,
        Err(err) => {
            warn!(kind, storage = %storage, error = %err, "storage driver unavailable");
            return false;
        }
    };
    match driver.apply(method, dest, list).await {
        Ok(()) => storage == Storage::Posix && method != ArchiveMethod::Bypass,
        Err(err) => {
            warn!(kind, method = %method, storage = %storage, error = %err, "archive operation failed");
            false
        }
    }
}
