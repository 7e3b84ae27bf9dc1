use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::memory::MemoryStatusStore;
use super::sqlite::SqliteStatusStore;
use super::traits::StatusStore;
use crate::pipeline::clock::Clock;
use crate::util::config::{DatabaseConfig, StatusStoreDriver};

/// 根据配置创建状态存储
pub async fn create_status_store(
    config: &DatabaseConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn StatusStore>> {
    match config.driver {
        StatusStoreDriver::Sqlite => {
            info!(
                "[card] 连接SQLite状态存储: {} (表: {})",
                config.sqlite.path, config.events_table
            );
            if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            let store = SqliteStatusStore::new(
                &config.sqlite.path,
                &config.events_table,
                config.sqlite.max_connections,
            )
            .await?
            .with_clock(clock);
            info!("[ok] SQLite状态存储初始化成功");
            Ok(Arc::new(store))
        }
        StatusStoreDriver::Memory => {
            warn!("[warn] 使用内存状态存储，进程退出后状态丢失");
            Ok(Arc::new(MemoryStatusStore::with_clock(clock)))
        }
    }
}
