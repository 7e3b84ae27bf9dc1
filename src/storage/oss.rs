use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::{services::Oss as OssService, Operator};
use std::time::Instant;
use tracing::{debug, error, info};

use super::traits::Storage;

/// OSS存储实现，一个实例对应一个 bucket
pub struct OssStorage {
    operator: Operator,
    bucket: String,
    endpoint: String,
}

impl OssStorage {
    pub fn new(config: OssConfig) -> Result<Self> {
        info!(
            target: "storage.oss",
            event = "oss.connect.start",
            endpoint = %config.endpoint,
            bucket = %config.bucket
        );

        let builder = OssService::default()
            .root(&config.root.unwrap_or_default())
            .bucket(&config.bucket)
            .endpoint(&config.endpoint)
            .access_key_id(&config.access_key_id)
            .access_key_secret(&config.access_key_secret);

        let operator = Operator::new(builder)
            .with_context(|| format!("Failed to build OSS operator for bucket {}", config.bucket))?
            .finish();

        Ok(Self {
            operator,
            bucket: config.bucket,
            endpoint: config.endpoint,
        })
    }
}

#[async_trait]
impl Storage for OssStorage {
    fn location(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        let start = Instant::now();

        match self
            .operator
            .write_with(key, data.to_vec())
            .content_type(content_type)
            .await
        {
            Ok(_) => {
                info!(
                    target: "storage.oss",
                    event = "oss.write",
                    bucket = %self.bucket,
                    key = %key,
                    size = data.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    target: "storage.oss",
                    event = "oss.write_failed",
                    bucket = %self.bucket,
                    endpoint = %self.endpoint,
                    key = %key,
                    kind = ?e.kind(),
                    error = %e
                );
                Err(e).context("Failed to write to OSS")
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        match self.operator.read(key).await {
            Ok(data) => {
                debug!(
                    target: "storage.oss",
                    event = "oss.read",
                    bucket = %self.bucket,
                    key = %key,
                    size = data.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64
                );
                Ok(Some(data.to_vec()))
            }
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                debug!(target: "storage.oss", bucket = %self.bucket, key = %key, "OSS对象不存在");
                Ok(None)
            }
            Err(e) => {
                error!(
                    target: "storage.oss",
                    event = "oss.read_failed",
                    bucket = %self.bucket,
                    key = %key,
                    kind = ?e.kind(),
                    error = %e
                );
                Err(e).context("Failed to read from OSS")
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.operator
            .delete(key)
            .await
            .with_context(|| format!("Failed to delete {} from OSS", key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.operator.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to check existence in OSS"),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.operator.check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!(
                    target: "storage.oss",
                    event = "oss.health_failed",
                    bucket = %self.bucket,
                    kind = ?e.kind(),
                    error = %e
                );
                Ok(false)
            }
        }
    }
}

/// OSS配置
#[derive(Debug, Clone)]
pub struct OssConfig {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub root: Option<String>,
}
