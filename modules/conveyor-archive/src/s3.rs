//! Object-store storage driver. Copy and move upload artifacts through the
//! S3 client and rewrite payload entries to `s3://bucket/key` URIs.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{info, warn};

use conveyor_common::ArchiveMethod;

use crate::error::{ArchiveError, Result};
use crate::StorageDriver;

const DEFAULT_BUCKET: &str = "workflow";

pub struct S3Driver {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Driver {
    /// Configure the client from `WORKFLOW_S3_ENDPOINT`,
    /// `WORKFLOW_S3_ACCESS_KEY`, and `WORKFLOW_S3_SECRET_KEY`.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("WORKFLOW_S3_ENDPOINT")
            .map_err(|_| ArchiveError::Config("WORKFLOW_S3_ENDPOINT is not set".into()))?;
        let access_key = std::env::var("WORKFLOW_S3_ACCESS_KEY")
            .map_err(|_| ArchiveError::Config("WORKFLOW_S3_ACCESS_KEY is not set".into()))?;
        let secret_key = std::env::var("WORKFLOW_S3_SECRET_KEY")
            .map_err(|_| ArchiveError::Config("WORKFLOW_S3_SECRET_KEY is not set".into()))?;
        let bucket =
            std::env::var("WORKFLOW_S3_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());

        let credentials = Credentials::new(access_key, secret_key, None, None, "workflow-env");
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket,
        })
    }

    async fn upload(&self, dest: &Path, items: &mut [String], remove_source: bool) -> Result<()> {
        for item in items.iter_mut() {
            let source = Path::new(item);
            if !source.exists() {
                warn!(item = %item, "source file does not exist, skipping");
                continue;
            }
            let key = dest
                .join(source.file_name().unwrap_or(source.as_os_str()))
                .display()
                .to_string();
            let key = key.trim_start_matches('/').to_string();
            let body = ByteStream::from_path(source)
                .await
                .map_err(|err| ArchiveError::Driver(err.to_string()))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(body)
                .send()
                .await
                .map_err(|err| ArchiveError::Driver(err.to_string()))?;
            if remove_source {
                std::fs::remove_file(source)?;
            }
            *item = format!("s3://{}/{key}", self.bucket);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    async fn apply(
        &self,
        method: ArchiveMethod,
        dest: &Path,
        items: &mut Vec<String>,
    ) -> Result<()> {
        match method {
            ArchiveMethod::Bypass => {
                info!("bypassing archive");
                Ok(())
            }
            ArchiveMethod::Copy | ArchiveMethod::Upload => self.upload(dest, items, false).await,
            ArchiveMethod::Move => self.upload(dest, items, true).await,
            ArchiveMethod::Delete => Err(ArchiveError::Unimplemented {
                operation: method.to_string(),
                storage: "s3",
            }),
        }
    }

    async fn permissions(&self, _dest: &Path, _site: &str) -> Result<()> {
        Err(ArchiveError::Unimplemented {
            operation: "permissions".to_string(),
            storage: "s3",
        })
    }
}
