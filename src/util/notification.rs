use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::model::CompletionNotice;
use crate::util::config::types::{NotificationConfig, NotificationDriver};
use crate::util::logging::standards::events;
use crate::util::task_queue::connect_with_retry;

/// 完成通知总线：尽力发布，不保证送达
#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn publish(&self, topic: &str, notice: &CompletionNotice) -> Result<()>;
}

/// 根据配置创建通知总线
pub async fn create_notification_bus(
    config: &NotificationConfig,
) -> Result<Arc<dyn NotificationBus>> {
    match config.driver {
        NotificationDriver::Log => Ok(Arc::new(LogNotificationBus)),
        NotificationDriver::Nats => {
            let url = config
                .nats_url
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| anyhow!("通知总线使用 NATS 驱动时必须配置 nats_url"))?;
            Ok(Arc::new(NatsNotificationBus::connect(url).await?))
        }
    }
}

/// 基于 NATS core 的通知总线，topic 即 subject
pub struct NatsNotificationBus {
    client: async_nats::Client,
}

impl NatsNotificationBus {
    pub async fn connect(server_url: &str) -> Result<Self> {
        let client = connect_with_retry(server_url).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationBus for NatsNotificationBus {
    async fn publish(&self, topic: &str, notice: &CompletionNotice) -> Result<()> {
        let payload = serde_json::to_vec(notice).context("序列化完成通知失败")?;
        self.client
            .publish(topic.to_string(), payload.into())
            .await
            .with_context(|| format!("发布完成通知失败: {}", topic))?;
        self.client
            .flush()
            .await
            .with_context(|| format!("刷新完成通知失败: {}", topic))?;
        Ok(())
    }
}

/// 只写日志的通知总线
pub struct LogNotificationBus;

#[async_trait]
impl NotificationBus for LogNotificationBus {
    async fn publish(&self, topic: &str, notice: &CompletionNotice) -> Result<()> {
        info!(
            target: "notify.log",
            event = events::NOTIFY_PUBLISHED,
            topic = %topic,
            source = %notice.source,
            detail_type = %notice.detail_type,
            event_id = %notice.event_id,
            event_type = %notice.event_type,
            processed = %notice.processed,
            processed_at = %notice.processed_at
        );
        Ok(())
    }
}

/// 内存通知总线，记录发布内容
#[derive(Default)]
pub struct MemoryNotificationBus {
    published: Mutex<Vec<(String, CompletionNotice)>>,
    fail: AtomicBool,
}

impl MemoryNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, CompletionNotice)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl NotificationBus for MemoryNotificationBus {
    async fn publish(&self, topic: &str, notice: &CompletionNotice) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("injected publish failure for {}", notice.event_id));
        }
        self.published
            .lock()
            .push((topic.to_string(), notice.clone()));
        Ok(())
    }
}
