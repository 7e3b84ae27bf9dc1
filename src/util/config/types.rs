//! 配置结构定义模块
//! 包含系统配置的所有数据结构

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::worker::BatchFailurePolicy;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub task_queue: TaskQueueConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 请求体上限（字节）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// 单个请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8964
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// 节点部署模式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub role: DeploymentRole,
    #[serde(default = "default_node_id")]
    pub node_id: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            role: DeploymentRole::Standalone,
            node_id: default_node_id(),
        }
    }
}

fn default_node_id() -> String {
    "node-01".to_string()
}

/// 节点角色定义
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentRole {
    /// 接入 + 进程内 worker
    #[default]
    Standalone,
    Intake,
    Worker,
}

impl DeploymentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentRole::Standalone => "standalone",
            DeploymentRole::Intake => "intake",
            DeploymentRole::Worker => "worker",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standalone" => Some(DeploymentRole::Standalone),
            "intake" => Some(DeploymentRole::Intake),
            "worker" => Some(DeploymentRole::Worker),
            _ => None,
        }
    }

    pub fn runs_intake(&self) -> bool {
        matches!(self, DeploymentRole::Standalone | DeploymentRole::Intake)
    }

    pub fn runs_worker(&self) -> bool {
        matches!(self, DeploymentRole::Standalone | DeploymentRole::Worker)
    }
}

impl fmt::Display for DeploymentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 存储驱动
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    #[default]
    Local,
    Oss,
    Memory,
}

/// 持久化存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub driver: StorageDriver,
    /// 原始层存储标识（bucket / 目录名）
    #[serde(default)]
    pub raw_bucket: String,
    /// 处理层存储标识
    #[serde(default)]
    pub processed_bucket: String,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub oss: Option<OssStorageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_storage_base_path")]
    pub base_path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_base_path(),
        }
    }
}

fn default_storage_base_path() -> String {
    "runtime/storage".to_string()
}

/// OSS存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OssStorageConfig {
    pub endpoint: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    #[serde(default)]
    pub root: Option<String>,
}

/// 状态存储驱动
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusStoreDriver {
    #[default]
    Sqlite,
    Memory,
}

/// 状态存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: StatusStoreDriver,
    /// 状态表名
    #[serde(default)]
    pub events_table: String,
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

/// SQLite数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    #[serde(default = "default_sqlite_path")]
    pub path: String,
    #[serde(default = "default_sqlite_max_connections")]
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            max_connections: default_sqlite_max_connections(),
        }
    }
}

fn default_sqlite_path() -> String {
    "runtime/data/edcp.db".to_string()
}

fn default_sqlite_max_connections() -> u32 {
    5
}

/// 任务队列驱动类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskQueueDriver {
    /// 本地内存通道，仅 standalone 角色可用
    #[default]
    Local,
    /// NATS JetStream，接入与 worker 可分开部署
    Nats,
}

/// 任务队列配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskQueueConfig {
    #[serde(default)]
    pub driver: TaskQueueDriver,
    #[serde(default)]
    pub local: LocalQueueConfig,
    #[serde(default)]
    pub nats: Option<NatsQueueConfig>,
}

impl TaskQueueConfig {
    /// 当前驱动的最大投递次数
    pub fn max_deliver(&self) -> u32 {
        match (self.driver, &self.nats) {
            (TaskQueueDriver::Nats, Some(nats)) => nats.max_deliver.max(1) as u32,
            _ => self.local.max_deliver.max(1),
        }
    }
}

/// 本地任务队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalQueueConfig {
    /// Tokio 通道容量，默认 128
    #[serde(default = "default_local_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_max_deliver")]
    pub max_deliver: u32,
    /// 失败消息重投前的等待（毫秒）
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_local_channel_capacity() -> usize {
    128
}

fn default_max_batch() -> usize {
    10
}

fn default_max_deliver() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for LocalQueueConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_local_channel_capacity(),
            max_batch: default_max_batch(),
            max_deliver: default_max_deliver(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// NATS JetStream 队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsQueueConfig {
    /// NATS 服务器地址，例如 nats://127.0.0.1:4222
    pub server_url: String,
    /// 队列 subject
    #[serde(default)]
    pub subject: String,
    #[serde(default = "default_nats_stream")]
    pub stream: String,
    #[serde(default = "default_nats_durable")]
    pub durable_consumer: String,
    /// 单条消息最大投递次数
    #[serde(default = "default_nats_max_deliver")]
    pub max_deliver: i32,
    /// Ack 等待时长（毫秒）
    #[serde(default = "default_nats_ack_wait_ms")]
    pub ack_wait_ms: u64,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// 拉取请求的等待时间（毫秒）
    #[serde(default = "default_nats_pull_wait_ms")]
    pub pull_wait_ms: u64,
    #[serde(default = "default_nats_max_messages")]
    pub max_messages: Option<i64>,
    #[serde(default = "default_nats_max_bytes")]
    pub max_bytes: Option<i64>,
    #[serde(default)]
    pub max_age_seconds: Option<u64>,
}

fn default_nats_stream() -> String {
    "EDCP_EVENTS".to_string()
}

fn default_nats_durable() -> String {
    "edcp-workers".to_string()
}

fn default_nats_max_deliver() -> i32 {
    5
}

fn default_nats_ack_wait_ms() -> u64 {
    60_000
}

fn default_nats_pull_wait_ms() -> u64 {
    1_000
}

fn default_nats_max_messages() -> Option<i64> {
    Some(100_000)
}

fn default_nats_max_bytes() -> Option<i64> {
    Some(1_073_741_824) // 1 GiB
}

impl Default for NatsQueueConfig {
    fn default() -> Self {
        Self {
            server_url: "nats://127.0.0.1:4222".to_string(),
            subject: String::new(),
            stream: default_nats_stream(),
            durable_consumer: default_nats_durable(),
            max_deliver: default_nats_max_deliver(),
            ack_wait_ms: default_nats_ack_wait_ms(),
            max_batch: default_max_batch(),
            pull_wait_ms: default_nats_pull_wait_ms(),
            max_messages: default_nats_max_messages(),
            max_bytes: default_nats_max_bytes(),
            max_age_seconds: None,
        }
    }
}

/// 通知总线驱动
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationDriver {
    #[default]
    Log,
    Nats,
}

/// 完成通知配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub driver: NotificationDriver,
    /// 通知 topic（事件总线名）
    #[serde(default)]
    pub topic: String,
    /// 未配置时沿用任务队列的 NATS 地址
    #[serde(default)]
    pub nats_url: Option<String>,
}

/// 处理层 worker 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub failure_policy: BatchFailurePolicy,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: LogFileConfig,
    /// 是否输出 JSON 结构化日志
    #[serde(default)]
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: LogFileConfig::default(),
            structured: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 日志文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: Option<u32>,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_log_directory(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_retention_days() -> Option<u32> {
    Some(7)
}
