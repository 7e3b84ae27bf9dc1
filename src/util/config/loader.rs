//! 配置加载模块
//! 处理配置文件的读取和环境变量覆盖

use super::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 从环境变量读取配置覆盖
    pub fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides(config, |name| std::env::var(name).ok())
    }

    /// 按给定的变量来源应用覆盖
    pub fn apply_overrides<F>(mut config: Config, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        tracing::info!("[tool] 应用环境变量配置覆盖...");

        // 服务器配置覆盖
        if let Some(host) = lookup("EDCP_HOST") {
            config.server.host = host.clone();
            tracing::info!("[ok] 环境变量覆盖服务器地址: {}", host);
        }

        if let Some(port_str) = lookup("EDCP_PORT") {
            match port_str.parse::<u16>() {
                Ok(port) => {
                    config.server.port = port;
                    tracing::info!("[ok] 环境变量覆盖服务器端口: {}", port);
                }
                Err(_) => tracing::warn!("[warn] EDCP_PORT 无法解析为端口号: {}", port_str),
            }
        }

        if let Some(role_str) = lookup("EDCP_DEPLOYMENT_ROLE") {
            match DeploymentRole::parse(&role_str) {
                Some(role) => {
                    config.deployment.role = role;
                    tracing::info!("[ok] 环境变量覆盖部署角色: {}", role);
                }
                None => tracing::warn!("[warn] 未知的部署角色: {}", role_str),
            }
        }

        // 存储标识
        if let Some(bucket) = lookup("EDCP_RAW_BUCKET") {
            config.storage.raw_bucket = bucket.clone();
            tracing::info!("[ok] 环境变量覆盖原始层存储: {}", bucket);
        }

        if let Some(bucket) = lookup("EDCP_PROCESSED_BUCKET") {
            config.storage.processed_bucket = bucket.clone();
            tracing::info!("[ok] 环境变量覆盖处理层存储: {}", bucket);
        }

        if let Some(endpoint) = lookup("EDCP_OSS_ENDPOINT") {
            config.storage.oss.get_or_insert_with(Default::default).endpoint = endpoint.clone();
            tracing::info!("[ok] 环境变量覆盖OSS端点: {}", endpoint);
        }

        if let Some(access_key) = lookup("EDCP_OSS_ACCESS_KEY") {
            config
                .storage
                .oss
                .get_or_insert_with(Default::default)
                .access_key_id = access_key;
            tracing::info!("[ok] 环境变量覆盖OSS访问密钥: [安全隐藏]");
        }

        if let Some(secret) = lookup("EDCP_OSS_SECRET") {
            config
                .storage
                .oss
                .get_or_insert_with(Default::default)
                .access_key_secret = secret;
            tracing::info!("[ok] 环境变量覆盖OSS密钥: [安全隐藏]");
        }

        if let Some(table) = lookup("EDCP_EVENTS_TABLE") {
            config.database.events_table = table.clone();
            tracing::info!("[ok] 环境变量覆盖状态表: {}", table);
        }

        // 队列与通知
        if let Some(url) = lookup("EDCP_NATS_URL") {
            config
                .task_queue
                .nats
                .get_or_insert_with(NatsQueueConfig::default)
                .server_url = url.clone();
            tracing::info!("[ok] 环境变量覆盖NATS地址: {}", url);
        }

        if let Some(subject) = lookup("EDCP_QUEUE_SUBJECT") {
            config
                .task_queue
                .nats
                .get_or_insert_with(NatsQueueConfig::default)
                .subject = subject.clone();
            tracing::info!("[ok] 环境变量覆盖队列 subject: {}", subject);
        }

        if let Some(topic) = lookup("EDCP_EVENT_BUS") {
            config.notification.topic = topic.clone();
            tracing::info!("[ok] 环境变量覆盖通知 topic: {}", topic);
        }

        if let Some(level) = lookup("EDCP_LOG_LEVEL") {
            config.logging.level = level.clone();
            tracing::info!("[ok] 环境变量覆盖日志级别: {}", level);
        }

        if let Some(value) = lookup("EDCP_LOG_STRUCTURED") {
            if let Ok(structured) = Self::parse_bool(&value) {
                config.logging.structured = structured;
                tracing::info!("[ok] 环境变量覆盖结构化日志: {}", structured);
            }
        }

        Self::update_dependent_fields(&mut config);
        config
    }

    /// 解析布尔环境变量
    fn parse_bool(value: &str) -> Result<bool, ()> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(true),
            "false" | "0" | "no" | "n" => Ok(false),
            _ => Err(()),
        }
    }

    /// 通知总线未单独配置地址时沿用队列的 NATS 地址
    fn update_dependent_fields(config: &mut Config) {
        if config.notification.driver == NotificationDriver::Nats
            && config
                .notification
                .nats_url
                .as_deref()
                .map(|url| url.trim().is_empty())
                .unwrap_or(true)
        {
            if let Some(nats) = &config.task_queue.nats {
                config.notification.nats_url = Some(nats.server_url.clone());
            }
        }
    }

    /// 配置加载（配置文件 + 环境变量）
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<Config> {
        let base_config = Self::read_yaml(path)?;
        let config = Self::apply_env_overrides(base_config);
        tracing::info!("[ok] 配置加载完成");
        Ok(config)
    }
}
