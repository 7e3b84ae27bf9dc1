pub mod event;

pub use event::{
    AcceptedResponse, CompletionNotice, ErrorResponse, EventStatus, ObjectLocation, StatusRecord,
    StatusUpdate, WorkDescriptor, NOTIFICATION_DETAIL_TYPE, NOTIFICATION_SOURCE,
};

use serde::{Deserialize, Serialize};

// 健康检查相关的数据结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub role: String,
    pub timestamp: String,
    pub components: Vec<ComponentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub name: String,
    pub status: String,
    pub details: Option<String>,
    pub response_time_ms: Option<u64>,
}
