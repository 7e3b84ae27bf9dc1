//! SQLite状态存储

pub mod connection;
pub mod queries;
pub mod schemas;

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::traits::{StatusStore, StatusStoreError, StatusStoreResult};
use crate::model::{EventStatus, StatusRecord, StatusUpdate};
use crate::pipeline::clock::{Clock, SystemClock};
use connection::ConnectionManager;
use queries::{InsertOutcome, StatusQueries};
use schemas::SchemaManager;

/// SQLite状态存储实现
pub struct SqliteStatusStore {
    pool: SqlitePool,
    table: String,
    clock: Arc<dyn Clock>,
}

impl SqliteStatusStore {
    /// 打开数据库并确保状态表存在
    pub async fn new(db_path: &str, table: &str, max_connections: u32) -> anyhow::Result<Self> {
        SchemaManager::validate_table_name(table)?;
        let pool = ConnectionManager::create_pool(db_path, max_connections).await?;
        ConnectionManager::validate_pool(&pool).await?;
        SchemaManager::create_status_table(&pool, table).await?;

        Ok(Self {
            pool,
            table: table.to_string(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn create(&self, record: &StatusRecord) -> StatusStoreResult<()> {
        match StatusQueries::insert(&self.pool, &self.table, record).await? {
            InsertOutcome::Inserted => Ok(()),
            InsertOutcome::Duplicate => Err(StatusStoreError::AlreadyExists(record.event_id.clone())),
        }
    }

    async fn update(
        &self,
        event_id: &str,
        update: &StatusUpdate,
    ) -> StatusStoreResult<StatusRecord> {
        let predecessors = EventStatus::predecessors_of(update.status);
        let affected = StatusQueries::update_conditional(
            &self.pool,
            &self.table,
            event_id,
            update,
            &predecessors,
            self.clock.now(),
        )
        .await?;

        let current = StatusQueries::get_by_id(&self.pool, &self.table, event_id).await?;
        match current {
            None => Err(StatusStoreError::NotFound(event_id.to_string())),
            Some(record) if affected == 0 => Err(StatusStoreError::InvalidTransition {
                event_id: event_id.to_string(),
                from: record.status,
                to: update.status,
            }),
            Some(record) => Ok(record),
        }
    }

    async fn get(&self, event_id: &str) -> StatusStoreResult<Option<StatusRecord>> {
        Ok(StatusQueries::get_by_id(&self.pool, &self.table, event_id).await?)
    }

    async fn health_check(&self) -> StatusStoreResult<bool> {
        Ok(StatusQueries::check_health(&self.pool).await?)
    }
}
