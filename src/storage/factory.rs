use anyhow::{anyhow, Result};
use std::sync::Arc;

use super::durable::DurableStore;
use super::local::LocalStorage;
use super::memory::MemoryStorage;
use super::oss::{OssConfig, OssStorage};
use super::traits::Storage;
use crate::util::config::{StorageConfig, StorageDriver};

/// 按存储标识创建单个后端
pub fn create_storage(config: &StorageConfig, location: &str) -> Result<Arc<dyn Storage>> {
    if location.trim().is_empty() {
        return Err(anyhow!("Storage location identifier is empty"));
    }

    match config.driver {
        StorageDriver::Local => {
            let storage = LocalStorage::new(&config.local.base_path, location)?;
            tracing::info!(
                target: "storage",
                event = "storage.init",
                driver = "local",
                base_path = %config.local.base_path,
                location = %location
            );
            Ok(Arc::new(storage))
        }
        StorageDriver::Oss => {
            let oss = config
                .oss
                .as_ref()
                .ok_or_else(|| anyhow!("OSS configuration missing"))?;

            let storage = OssStorage::new(OssConfig {
                bucket: location.to_string(),
                endpoint: oss.endpoint.clone(),
                access_key_id: oss.access_key_id.clone(),
                access_key_secret: oss.access_key_secret.clone(),
                root: oss.root.clone(),
            })?;
            tracing::info!(
                target: "storage",
                event = "storage.init",
                driver = "oss",
                location = %location
            );
            Ok(Arc::new(storage))
        }
        StorageDriver::Memory => {
            tracing::warn!(
                target: "storage",
                event = "storage.init",
                driver = "memory",
                location = %location,
                "内存存储不具备持久性，仅用于开发与测试"
            );
            Ok(Arc::new(MemoryStorage::new(location)))
        }
    }
}

/// 创建双命名空间存储
///
/// `processed_bucket` 为空时（仅接入角色）处理层复用原始层后端，接入侧不会写入处理层。
pub fn create_durable_store(config: &StorageConfig) -> Result<DurableStore> {
    let raw = create_storage(config, &config.raw_bucket)?;
    let processed = if config.processed_bucket.trim().is_empty() {
        Arc::clone(&raw)
    } else if config.processed_bucket == config.raw_bucket {
        Arc::clone(&raw)
    } else {
        create_storage(config, &config.processed_bucket)?
    };
    Ok(DurableStore::new(raw, processed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::durable::Namespace;
    use crate::util::config::LocalStorageConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_local_durable_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            driver: StorageDriver::Local,
            raw_bucket: "bronze".to_string(),
            processed_bucket: "silver".to_string(),
            local: LocalStorageConfig {
                base_path: temp_dir.path().to_string_lossy().to_string(),
            },
            oss: None,
        };

        let store = create_durable_store(&config).unwrap();
        assert!(store.health_check().await.unwrap());
        assert_eq!(store.location_of(Namespace::Raw), "bronze");
        assert_eq!(store.location_of(Namespace::Processed), "silver");
    }

    #[test]
    fn test_oss_requires_config() {
        let config = StorageConfig {
            driver: StorageDriver::Oss,
            raw_bucket: "bronze".to_string(),
            processed_bucket: String::new(),
            local: LocalStorageConfig::default(),
            oss: None,
        };
        assert!(create_durable_store(&config).is_err());
    }
}
