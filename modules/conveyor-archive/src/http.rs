//! HTTP storage driver placeholder: only bypass is supported.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use conveyor_common::ArchiveMethod;

use crate::error::{ArchiveError, Result};
use crate::StorageDriver;

pub struct HttpDriver;

#[async_trait]
impl StorageDriver for HttpDriver {
    async fn apply(
        &self,
        method: ArchiveMethod,
        _dest: &Path,
        _items: &mut Vec<String>,
    ) -> Result<()> {
        match method {
            ArchiveMethod::Bypass => {
                info!("bypassing archive");
                Ok(())
            }
            other => Err(ArchiveError::Unimplemented {
                operation: other.to_string(),
                storage: "http",
            }),
        }
    }

    async fn permissions(&self, _dest: &Path, _site: &str) -> Result<()> {
        Err(ArchiveError::Unimplemented {
            operation: "permissions".to_string(),
            storage: "http",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_bypass_is_supported() {
        let dest = Path::new("/nonexistent");
        assert!(HttpDriver
            .apply(ArchiveMethod::Bypass, dest, &mut vec![])
            .await
            .is_ok());
        for method in [
            ArchiveMethod::Copy,
            ArchiveMethod::Move,
            ArchiveMethod::Delete,
            ArchiveMethod::Upload,
        ] {
            let result = HttpDriver.apply(method, dest, &mut vec![]).await;
            assert!(matches!(result, Err(ArchiveError::Unimplemented { .. })));
        }
    }
}
