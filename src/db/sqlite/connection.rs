//! SQLite连接管理

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// SQLite连接管理器
pub struct ConnectionManager;

impl ConnectionManager {
    /// 创建SQLite连接池，数据库文件不存在时自动创建
    pub async fn create_pool(db_path: &str, max_connections: u32) -> Result<SqlitePool> {
        // 确保数据库目录存在
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", db_path))?;

        info!(
            target: "db.sqlite",
            event = "db.connected",
            path = %db_path,
            max_connections = max_connections
        );
        Ok(pool)
    }

    /// 验证连接池状态
    pub async fn validate_pool(pool: &SqlitePool) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(pool).await?;
        Ok(())
    }
}
