use async_trait::async_trait;

use crate::model::{EventStatus, StatusRecord, StatusUpdate};

/// 状态存储错误
#[derive(Debug, thiserror::Error)]
pub enum StatusStoreError {
    #[error("status record already exists: {0}")]
    AlreadyExists(String),

    #[error("status record not found: {0}")]
    NotFound(String),

    #[error("invalid status transition for {event_id}: {from} -> {to}")]
    InvalidTransition {
        event_id: String,
        from: EventStatus,
        to: EventStatus,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StatusStoreResult<T> = std::result::Result<T, StatusStoreError>;

/// 事件状态存储trait
///
/// 每个事件一条记录，状态迁移必须满足 `EventStatus::can_transition_to`，
/// 且以单次条件写完成。
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// 创建记录，`event_id` 已存在时返回 `AlreadyExists`
    async fn create(&self, record: &StatusRecord) -> StatusStoreResult<()>;

    /// 条件更新，返回更新后的记录
    async fn update(&self, event_id: &str, update: &StatusUpdate)
        -> StatusStoreResult<StatusRecord>;

    async fn get(&self, event_id: &str) -> StatusStoreResult<Option<StatusRecord>>;

    async fn health_check(&self) -> StatusStoreResult<bool>;
}
