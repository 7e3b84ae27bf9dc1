use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, consumer, stream, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::model::WorkDescriptor;
use crate::pipeline::error::PipelineError;
use crate::pipeline::worker::BatchOutcome;
use crate::util::config::types::{
    LocalQueueConfig, NatsQueueConfig, TaskQueueConfig, TaskQueueDriver,
};
use crate::util::logging::standards::events;

pub const EVENT_QUEUE_NAME: &str = "events";

/// 队列投递给消费者的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: Vec<u8>,
    /// 第几次投递，从 1 开始
    pub delivery_attempt: u32,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            body,
            delivery_attempt: 1,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.delivery_attempt = attempt.max(1);
        self
    }
}

/// 批量消息处理器
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(
        &self,
        messages: Vec<QueueMessage>,
    ) -> std::result::Result<BatchOutcome, PipelineError>;
}

/// 工作队列：至少一次投递，不保证顺序
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, descriptor: &WorkDescriptor) -> Result<()>;

    fn driver(&self) -> &'static str;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// 一批消息的处理结果对应到每条消息的确认动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry,
    Terminate,
}

/// 按批处理结果计算每条消息的确认动作
///
/// 批处理整体失败时全部重投；成功时 `retry` 中的消息重投，死信终止，其余确认。
pub fn dispositions(
    messages: &[QueueMessage],
    result: &std::result::Result<BatchOutcome, PipelineError>,
) -> Vec<(String, Disposition)> {
    match result {
        Err(_) => messages
            .iter()
            .map(|m| (m.id.clone(), Disposition::Retry))
            .collect(),
        Ok(outcome) => messages
            .iter()
            .map(|m| {
                let disposition = if outcome.retry.contains(&m.id) {
                    Disposition::Retry
                } else if outcome.dead_lettered.contains(&m.id) {
                    Disposition::Terminate
                } else {
                    Disposition::Ack
                };
                (m.id.clone(), disposition)
            })
            .collect(),
    }
}

/// 根据配置初始化任务队列实现
///
/// 传入 `handler` 时在本进程内消费：本地队列必须提供，NATS 队列则额外启动内联消费者。
pub async fn initialize_task_queue(
    config: &TaskQueueConfig,
    handler: Option<Arc<dyn BatchHandler>>,
) -> Result<Arc<dyn WorkQueue>> {
    match config.driver {
        TaskQueueDriver::Local => {
            let handler =
                handler.ok_or_else(|| anyhow!("本地任务队列需要在同一进程内运行 worker"))?;
            Ok(Arc::new(LocalTaskQueue::new(
                EVENT_QUEUE_NAME,
                &config.local,
                handler,
            )))
        }
        TaskQueueDriver::Nats => {
            let nats_config = config
                .nats
                .as_ref()
                .cloned()
                .ok_or_else(|| anyhow!("缺少 NATS 队列配置"))?;

            let queue = NatsTaskQueue::connect(EVENT_QUEUE_NAME, &nats_config).await?;

            if let Some(handler) = handler {
                let consumer =
                    NatsTaskQueueConsumer::new(queue.jetstream_context(), nats_config.clone());
                tokio::spawn(async move {
                    if let Err(err) = consumer.run(handler).await {
                        error!("内联 NATS 队列消费失败: {:#}", err);
                    }
                });
            }

            Ok(Arc::new(queue))
        }
    }
}

/// 单机队列实现，使用 tokio mpsc 连接本地 handler
///
/// 消费任务每次最多取 `max_batch` 条，处理失败的消息在 `retry_delay_ms`
/// 之后重新投递，超过 `max_deliver` 次后丢弃并记录错误。
pub struct LocalTaskQueue {
    sender: mpsc::Sender<QueueMessage>,
    queue_name: &'static str,
    next_id: AtomicU64,
}

impl LocalTaskQueue {
    pub fn new(
        queue_name: &'static str,
        config: &LocalQueueConfig,
        handler: Arc<dyn BatchHandler>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(16));
        let settings = config.clone();
        tokio::spawn(async move {
            run_local_consumer(queue_name, receiver, handler, settings).await;
        });
        Self {
            sender,
            queue_name,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl WorkQueue for LocalTaskQueue {
    async fn enqueue(&self, descriptor: &WorkDescriptor) -> Result<()> {
        let body = serde_json::to_vec(descriptor).context("序列化工作描述失败")?;
        let id = format!(
            "{}-{}",
            self.queue_name,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );

        self.sender
            .send(QueueMessage::new(id.clone(), body))
            .await
            .map_err(|e| anyhow!("发送工作描述失败: {}", e))?;

        debug!(
            target: "queue.local",
            event = events::QUEUE_ENQUEUE,
            message_id = %id,
            event_id = %descriptor.event_id
        );
        Ok(())
    }

    fn driver(&self) -> &'static str {
        "local"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.sender.is_closed())
    }
}

async fn run_local_consumer(
    queue_name: &'static str,
    mut receiver: mpsc::Receiver<QueueMessage>,
    handler: Arc<dyn BatchHandler>,
    config: LocalQueueConfig,
) {
    let max_batch = config.max_batch.max(1);
    let max_deliver = config.max_deliver.max(1);
    let retry_delay = Duration::from_millis(config.retry_delay_ms);
    let mut redeliver: VecDeque<QueueMessage> = VecDeque::new();

    loop {
        let mut batch = Vec::with_capacity(max_batch);
        if redeliver.is_empty() {
            match receiver.recv().await {
                Some(message) => batch.push(message),
                None => break,
            }
        } else {
            sleep(retry_delay).await;
            while batch.len() < max_batch {
                match redeliver.pop_front() {
                    Some(message) => batch.push(message),
                    None => break,
                }
            }
        }
        while batch.len() < max_batch {
            match receiver.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        debug!(
            target: "queue.local",
            event = events::QUEUE_DEQUEUE,
            queue = queue_name,
            batch_size = batch.len()
        );

        let result = handler.handle_batch(batch.clone()).await;
        if let Err(err) = &result {
            warn!(target: "queue.local", queue = queue_name, error = %err, "批处理失败，整批重新投递");
        }

        let actions: HashMap<String, Disposition> =
            dispositions(&batch, &result).into_iter().collect();
        for message in batch {
            if actions.get(&message.id) != Some(&Disposition::Retry) {
                continue;
            }
            if message.delivery_attempt >= max_deliver {
                error!(
                    target: "queue.local",
                    event = events::WORKER_DEAD_LETTER,
                    queue = queue_name,
                    message_id = %message.id,
                    attempts = message.delivery_attempt,
                    "超过最大投递次数，丢弃消息"
                );
                continue;
            }
            info!(
                target: "queue.local",
                event = events::QUEUE_REDELIVER,
                queue = queue_name,
                message_id = %message.id,
                next_attempt = message.delivery_attempt + 1
            );
            let attempt = message.delivery_attempt + 1;
            redeliver.push_back(message.with_attempt(attempt));
        }
    }

    info!(target: "queue.local", queue = queue_name, "本地任务队列已关闭");
}

/// 基于 NATS JetStream 的任务队列实现
#[derive(Clone)]
pub struct NatsTaskQueue {
    context: jetstream::Context,
    subject: String,
    stream: String,
    queue_name: &'static str,
}

impl NatsTaskQueue {
    /// 连接NATS服务器，带超时和重试机制
    pub async fn connect(queue_name: &'static str, config: &NatsQueueConfig) -> Result<Self> {
        let client = connect_with_retry(&config.server_url).await?;
        let context = jetstream::new(client);

        context
            .get_or_create_stream(build_stream_config(config))
            .await
            .with_context(|| format!("创建/获取 JetStream Stream [{}] 失败", config.stream))?;

        info!("[ok] JetStream Stream [{}] 就绪", config.stream);

        Ok(Self {
            context,
            subject: config.subject.clone(),
            stream: config.stream.clone(),
            queue_name,
        })
    }

    pub fn jetstream_context(&self) -> jetstream::Context {
        self.context.clone()
    }

    pub fn queue_name(&self) -> &'static str {
        self.queue_name
    }

    /// 获取队列深度 (pending消息数)
    pub async fn get_queue_depth(&self) -> Result<u64> {
        let mut stream = self
            .context
            .get_stream(&self.stream)
            .await
            .context("获取Stream失败")?;
        let info = stream.info().await.context("获取Stream信息失败")?;
        Ok(info.state.messages)
    }
}

#[async_trait]
impl WorkQueue for NatsTaskQueue {
    async fn enqueue(&self, descriptor: &WorkDescriptor) -> Result<()> {
        let payload = serde_json::to_vec(descriptor).context("序列化工作描述失败")?;

        let ack = self
            .context
            .publish(self.subject.clone(), payload.into())
            .await
            .context("发布工作描述消息失败")?;

        ack.await.context("等待 JetStream 确认失败")?;

        debug!(
            target: "queue.nats",
            event = events::QUEUE_ENQUEUE,
            subject = %self.subject,
            event_id = %descriptor.event_id
        );
        Ok(())
    }

    fn driver(&self) -> &'static str {
        "nats"
    }

    async fn health_check(&self) -> Result<bool> {
        match tokio::time::timeout(Duration::from_secs(5), self.context.get_stream(&self.stream))
            .await
        {
            Ok(Ok(mut stream)) => Ok(stream.info().await.is_ok()),
            Ok(Err(e)) => Err(anyhow!("获取Stream失败: {}", e)),
            Err(_) => Err(anyhow!("健康检查超时（5秒）")),
        }
    }
}

/// 连接NATS，失败时指数退避重试
pub(crate) async fn connect_with_retry(server_url: &str) -> Result<async_nats::Client> {
    const MAX_RETRIES: u32 = 3;
    const CONNECT_TIMEOUT_SECS: u64 = 10;
    let mut retry_delay = Duration::from_secs(1);

    info!("[plug] 正在连接NATS服务器: {}", server_url);

    for attempt in 1..=MAX_RETRIES {
        let connect_result = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            async_nats::connect(server_url),
        )
        .await;

        match connect_result {
            Ok(Ok(client)) => {
                info!("[ok] NATS连接成功 (尝试 {}/{})", attempt, MAX_RETRIES);
                return Ok(client);
            }
            Ok(Err(e)) => {
                warn!(
                    "[fail] NATS连接失败 (尝试 {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
            }
            Err(_timeout) => {
                warn!(
                    "NATS连接超时 (尝试 {}/{}, {}秒)",
                    attempt, MAX_RETRIES, CONNECT_TIMEOUT_SECS
                );
            }
        }

        if attempt < MAX_RETRIES {
            sleep(retry_delay).await;
            retry_delay *= 2;
        }
    }

    let error_msg = format!(
        "NATS连接失败，已重试{}次，配置地址: {}",
        MAX_RETRIES, server_url
    );
    error!("[fail] {}", error_msg);
    Err(anyhow!(error_msg))
}

/// NATS JetStream 批量消费者
pub struct NatsTaskQueueConsumer {
    context: jetstream::Context,
    config: NatsQueueConfig,
}

impl NatsTaskQueueConsumer {
    pub fn new(context: jetstream::Context, config: NatsQueueConfig) -> Self {
        Self { context, config }
    }

    pub async fn connect(config: NatsQueueConfig) -> Result<Self> {
        let queue = NatsTaskQueue::connect(EVENT_QUEUE_NAME, &config).await?;
        Ok(Self::new(queue.jetstream_context(), config))
    }

    pub async fn run(self, handler: Arc<dyn BatchHandler>) -> Result<()> {
        info!(
            stream = %self.config.stream,
            subject = %self.config.subject,
            durable_consumer = %self.config.durable_consumer,
            ack_wait_ms = self.config.ack_wait_ms,
            max_batch = self.config.max_batch,
            max_deliver = self.config.max_deliver,
            "启动 NATS 任务队列消费者"
        );

        let stream = self
            .context
            .get_or_create_stream(build_stream_config(&self.config))
            .await
            .with_context(|| format!("创建/获取 JetStream Stream [{}] 失败", self.config.stream))?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.durable_consumer,
                build_consumer_config(&self.config),
            )
            .await
            .with_context(|| format!("创建/获取消费者 [{}] 失败", self.config.durable_consumer))?;

        let idle_wait = Duration::from_millis(self.config.pull_wait_ms.max(500));

        loop {
            let mut batch = match consumer
                .batch()
                .max_messages(self.config.max_batch.max(1))
                .expires(Duration::from_millis(self.config.pull_wait_ms))
                .messages()
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    warn!("从 NATS 拉取消息失败: {:#}", err);
                    sleep(idle_wait).await;
                    continue;
                }
            };

            let mut messages = Vec::new();
            let mut raw_messages: HashMap<String, jetstream::Message> = HashMap::new();
            while let Some(item) = batch.next().await {
                match item {
                    Ok(message) => {
                        let (id, delivered) = match message.info() {
                            Ok(info) => (info.stream_sequence.to_string(), info.delivered),
                            Err(_) => (uuid::Uuid::new_v4().to_string(), 1),
                        };
                        messages.push(
                            QueueMessage::new(id.clone(), message.payload.to_vec())
                                .with_attempt(delivery_attempt(delivered)),
                        );
                        raw_messages.insert(id, message);
                    }
                    Err(err) => {
                        warn!("从 NATS 拉取消息失败: {:#}", err);
                        break;
                    }
                }
            }

            if messages.is_empty() {
                continue;
            }

            info!(
                target: "queue.consumer",
                event = events::QUEUE_DEQUEUE,
                stream = %self.config.stream,
                consumer = %self.config.durable_consumer,
                batch_size = messages.len()
            );

            let result = handler.handle_batch(messages.clone()).await;
            if let Err(err) = &result {
                error!(
                    stream = %self.config.stream,
                    error = %err,
                    "批处理失败，整批 NAK 等待 JetStream 重投"
                );
            }

            for (id, disposition) in dispositions(&messages, &result) {
                let Some(message) = raw_messages.remove(&id) else {
                    continue;
                };
                let ack_result = match disposition {
                    Disposition::Ack => message.ack().await,
                    Disposition::Retry => message.ack_with(AckKind::Nak(None)).await,
                    Disposition::Terminate => message.ack_with(AckKind::Term).await,
                };
                if let Err(err) = ack_result {
                    warn!(message_id = %id, disposition = ?disposition, "确认消息失败: {:#}", err);
                }
            }
        }
    }
}

fn build_stream_config(config: &NatsQueueConfig) -> stream::Config {
    let mut stream_config = stream::Config::default();
    stream_config.name = config.stream.clone();
    stream_config.subjects = vec![config.subject.clone()];
    stream_config.retention = stream::RetentionPolicy::WorkQueue;
    let max_messages = config.max_messages.unwrap_or(-1);
    stream_config.max_messages = max_messages;
    stream_config.max_bytes = config.max_bytes.unwrap_or(-1);
    if let Some(age_secs) = config.max_age_seconds {
        stream_config.max_age = Duration::from_secs(age_secs);
    }
    stream_config
}

fn build_consumer_config(config: &NatsQueueConfig) -> consumer::pull::Config {
    consumer::pull::Config {
        durable_name: Some(config.durable_consumer.clone()),
        ack_policy: consumer::AckPolicy::Explicit,
        ack_wait: Duration::from_millis(config.ack_wait_ms),
        max_deliver: config.max_deliver as i64,
        filter_subject: config.subject.clone(),
        max_batch: config.max_batch as i64,
        ..Default::default()
    }
}

/// 启动任务队列 worker（独立进程）
pub async fn start_queue_worker(
    config: &TaskQueueConfig,
    handler: Arc<dyn BatchHandler>,
) -> Result<()> {
    match config.driver {
        TaskQueueDriver::Local => Err(anyhow!(
            "本地任务队列只能在 standalone 角色内消费，独立 worker 需要 NATS 驱动"
        )),
        TaskQueueDriver::Nats => {
            let nats_config = config
                .nats
                .as_ref()
                .cloned()
                .ok_or_else(|| anyhow!("缺少 NATS 队列配置"))?;
            let consumer = NatsTaskQueueConsumer::connect(nats_config).await?;
            consumer.run(handler).await
        }
    }
}

/// 内存队列，记录入队的工作描述，用于测试与故障注入
#[derive(Default)]
pub struct MemoryWorkQueue {
    descriptors: Mutex<Vec<WorkDescriptor>>,
    fail: AtomicBool,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn descriptors(&self) -> Vec<WorkDescriptor> {
        self.descriptors.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.descriptors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.lock().is_empty()
    }

    /// 取出全部已入队描述，转换为首次投递的消息
    pub fn drain_messages(&self) -> Vec<QueueMessage> {
        let drained: Vec<WorkDescriptor> = self.descriptors.lock().drain(..).collect();
        drained
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| {
                let body = serde_json::to_vec(&descriptor).unwrap_or_default();
                QueueMessage::new(format!("m-{}", index + 1), body)
            })
            .collect()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, descriptor: &WorkDescriptor) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("injected enqueue failure for {}", descriptor.event_id));
        }
        self.descriptors.lock().push(descriptor.clone());
        Ok(())
    }

    fn driver(&self) -> &'static str {
        "memory"
    }
}

/// JetStream 的投递计数折算为从 1 开始的尝试次数
fn delivery_attempt(delivered: i64) -> u32 {
    u32::try_from(delivered.max(1)).unwrap_or(u32::MAX)
}
