use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// 通知来源标识
pub const NOTIFICATION_SOURCE: &str = "edcp.worker";
/// 通知类型
pub const NOTIFICATION_DETAIL_TYPE: &str = "EventProcessed";

/// 事件生命周期状态
///
/// `RECEIVED → ENQUEUED → PROCESSED`，失败分支 `ENQUEUED → FAILED`。
/// 没有任何回退路径，`FAILED` 为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Received,
    Enqueued,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Received => "RECEIVED",
            EventStatus::Enqueued => "ENQUEUED",
            EventStatus::Processed => "PROCESSED",
            EventStatus::Failed => "FAILED",
        }
    }

    /// 状态机校验
    ///
    /// `PROCESSED → PROCESSED` 允许，重复投递时重新处理同一事件不应报错。
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Received, EventStatus::Enqueued)
                | (EventStatus::Enqueued, EventStatus::Processed)
                | (EventStatus::Enqueued, EventStatus::Failed)
                | (EventStatus::Processed, EventStatus::Processed)
        )
    }

    /// 允许迁移到 `next` 的所有前驱状态，供存储层拼接条件更新
    pub fn predecessors_of(next: EventStatus) -> Vec<EventStatus> {
        [
            EventStatus::Received,
            EventStatus::Enqueued,
            EventStatus::Processed,
            EventStatus::Failed,
        ]
        .into_iter()
        .filter(|from| from.can_transition_to(next))
        .collect()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Processed | EventStatus::Failed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RECEIVED" => Ok(EventStatus::Received),
            "ENQUEUED" => Ok(EventStatus::Enqueued),
            "PROCESSED" => Ok(EventStatus::Processed),
            "FAILED" => Ok(EventStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 持久化存储中的对象位置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.bucket.trim().is_empty() && !self.key.trim().is_empty()
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// 事件状态记录，每个 eventId 唯一一条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub event_id: String,
    pub event_type: String,
    pub raw_location: ObjectLocation,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_location: Option<ObjectLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    /// 接入阶段创建的初始记录（RECEIVED 与 ENQUEUED 合并为一次提交）
    pub fn enqueued(
        event_id: &str,
        event_type: &str,
        raw_location: ObjectLocation,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            raw_location,
            status: EventStatus::Enqueued,
            created_at,
            processed_at: None,
            processed_location: None,
            failure_reason: None,
            updated_at: created_at,
        }
    }

    /// 在内存中应用一次局部更新，只覆盖更新中携带的字段
    pub fn apply(&mut self, update: &StatusUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        if let Some(processed_at) = update.processed_at {
            self.processed_at = Some(processed_at);
        }
        if let Some(location) = &update.processed_location {
            self.processed_location = Some(location.clone());
        }
        if let Some(reason) = &update.failure_reason {
            self.failure_reason = Some(reason.clone());
        }
        self.updated_at = now;
    }
}

/// 状态记录的定向字段更新
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: EventStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_location: Option<ObjectLocation>,
    pub failure_reason: Option<String>,
}

impl StatusUpdate {
    pub fn processed(processed_at: DateTime<Utc>, processed_location: ObjectLocation) -> Self {
        Self {
            status: EventStatus::Processed,
            processed_at: Some(processed_at),
            processed_location: Some(processed_location),
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Failed,
            processed_at: None,
            processed_location: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// 队列上的工作描述
///
/// 缺失字段反序列化为空值，由 `missing_fields` 统一报告。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkDescriptor {
    pub event_id: String,
    pub event_type: String,
    pub raw_location: ObjectLocation,
}

impl WorkDescriptor {
    pub fn new(event_id: &str, event_type: &str, raw_location: ObjectLocation) -> Self {
        Self {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            raw_location,
        }
    }

    /// 必填字段校验，返回缺失字段名
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.event_id.trim().is_empty() {
            missing.push("eventId");
        }
        if self.event_type.trim().is_empty() {
            missing.push("eventType");
        }
        if self.raw_location.bucket.trim().is_empty() {
            missing.push("rawLocation.bucket");
        }
        if self.raw_location.key.trim().is_empty() {
            missing.push("rawLocation.key");
        }
        missing
    }
}

/// 处理完成通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotice {
    pub source: String,
    pub detail_type: String,
    pub event_id: String,
    pub event_type: String,
    pub raw: ObjectLocation,
    pub processed: ObjectLocation,
    pub processed_at: String,
}

impl CompletionNotice {
    pub fn new(
        descriptor: &WorkDescriptor,
        processed: ObjectLocation,
        processed_at: String,
    ) -> Self {
        Self {
            source: NOTIFICATION_SOURCE.to_string(),
            detail_type: NOTIFICATION_DETAIL_TYPE.to_string(),
            event_id: descriptor.event_id.clone(),
            event_type: descriptor.event_type.clone(),
            raw: descriptor.raw_location.clone(),
            processed,
            processed_at,
        }
    }
}

/// 接入成功响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub status: String,
    pub event_id: String,
}

impl AcceptedResponse {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            status: "accepted".to_string(),
            event_id: event_id.into(),
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
