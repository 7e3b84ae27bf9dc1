//! 事件状态表结构

use anyhow::{bail, Result};
use sqlx::SqlitePool;

/// 数据库表结构管理器
pub struct SchemaManager;

impl SchemaManager {
    /// 表名只允许字母、数字与下划线，拼接进 SQL 前必须校验
    pub fn validate_table_name(table: &str) -> Result<()> {
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!("Invalid status table name: {:?}", table);
        }
        Ok(())
    }

    pub async fn create_status_table(pool: &SqlitePool, table: &str) -> Result<()> {
        Self::validate_table_name(table)?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                event_id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                raw_bucket TEXT NOT NULL,
                raw_key TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                processed_at TEXT,
                processed_bucket TEXT,
                processed_key TEXT,
                failure_reason TEXT,
                updated_at TEXT NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE INDEX IF NOT EXISTS idx_{table}_status
            ON {table}(status, updated_at)
            "#
        ))
        .execute(pool)
        .await?;

        tracing::info!(target: "db.sqlite", event = "db.schema_ready", table = %table);
        Ok(())
    }
}
