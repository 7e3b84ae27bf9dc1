//! 事件状态表查询

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;

use crate::model::{EventStatus, ObjectLocation, StatusRecord, StatusUpdate};

/// 插入结果
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

pub struct StatusQueries;

impl StatusQueries {
    pub async fn insert(
        pool: &SqlitePool,
        table: &str,
        record: &StatusRecord,
    ) -> Result<InsertOutcome> {
        let sql = format!(
            r#"
            INSERT INTO {table} (
                event_id, event_type, raw_bucket, raw_key, status, created_at,
                processed_at, processed_bucket, processed_key, failure_reason, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        );

        let result = sqlx::query(&sql)
            .bind(&record.event_id)
            .bind(&record.event_type)
            .bind(&record.raw_location.bucket)
            .bind(&record.raw_location.key)
            .bind(record.status.as_str())
            .bind(record.created_at.to_rfc3339())
            .bind(record.processed_at.map(|at| at.to_rfc3339()))
            .bind(record.processed_location.as_ref().map(|l| l.bucket.clone()))
            .bind(record.processed_location.as_ref().map(|l| l.key.clone()))
            .bind(record.failure_reason.as_deref())
            .bind(record.updated_at.to_rfc3339())
            .execute(pool)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to insert status {}", record.event_id)),
        }
    }

    /// 条件更新：只有当前状态属于 `predecessors` 时才会写入，返回受影响行数
    pub async fn update_conditional(
        pool: &SqlitePool,
        table: &str,
        event_id: &str,
        update: &StatusUpdate,
        predecessors: &[EventStatus],
        updated_at: DateTime<Utc>,
    ) -> Result<u64> {
        if predecessors.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; predecessors.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE {table} SET
                status = ?,
                processed_at = COALESCE(?, processed_at),
                processed_bucket = COALESCE(?, processed_bucket),
                processed_key = COALESCE(?, processed_key),
                failure_reason = COALESCE(?, failure_reason),
                updated_at = ?
            WHERE event_id = ? AND status IN ({placeholders})
            "#
        );

        let mut query = sqlx::query(&sql)
            .bind(update.status.as_str())
            .bind(update.processed_at.map(|at| at.to_rfc3339()))
            .bind(update.processed_location.as_ref().map(|l| l.bucket.clone()))
            .bind(update.processed_location.as_ref().map(|l| l.key.clone()))
            .bind(update.failure_reason.as_deref())
            .bind(updated_at.to_rfc3339())
            .bind(event_id);
        for status in predecessors {
            query = query.bind(status.as_str());
        }

        let result = query
            .execute(pool)
            .await
            .with_context(|| format!("Failed to update status {}", event_id))?;
        Ok(result.rows_affected())
    }

    pub async fn get_by_id(
        pool: &SqlitePool,
        table: &str,
        event_id: &str,
    ) -> Result<Option<StatusRecord>> {
        let sql = format!("SELECT * FROM {table} WHERE event_id = ?");
        let row = sqlx::query(&sql)
            .bind(event_id)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("Failed to load status {}", event_id))?;

        row.map(Self::row_to_record).transpose()
    }

    fn row_to_record(row: SqliteRow) -> Result<StatusRecord> {
        let status_str: String = row.try_get("status")?;
        let status = EventStatus::from_str(&status_str)
            .map_err(|_| anyhow!("Unknown status value in store: {}", status_str))?;

        let processed_bucket: Option<String> = row.try_get("processed_bucket")?;
        let processed_key: Option<String> = row.try_get("processed_key")?;
        let processed_location = match (processed_bucket, processed_key) {
            (Some(bucket), Some(key)) => Some(ObjectLocation::new(bucket, key)),
            _ => None,
        };

        let processed_at: Option<String> = row.try_get("processed_at")?;

        Ok(StatusRecord {
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            raw_location: ObjectLocation::new(
                row.try_get::<String, _>("raw_bucket")?,
                row.try_get::<String, _>("raw_key")?,
            ),
            status,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            processed_at: processed_at.as_deref().map(parse_timestamp).transpose()?,
            processed_location,
            failure_reason: row.try_get("failure_reason")?,
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
        })
    }

    pub async fn check_health(pool: &SqlitePool) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(pool)
            .await
            .map(|_| true)
            .map_err(|e| e.into())
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in store: {}", value))
}
