use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use super::clock::Clock;
use super::error::{PipelineError, ProcessStage};
use super::paths;
use super::transform::{self, format_timestamp};
use crate::db::{StatusStore, StatusStoreError};
use crate::model::{CompletionNotice, EventStatus, StatusUpdate, WorkDescriptor};
use crate::storage::{DurableStore, Namespace, ObjectMissing, CONTENT_TYPE_JSON};
use crate::util::logging::standards::events;
use crate::util::notification::NotificationBus;
use crate::util::task_queue::{BatchHandler, QueueMessage};

/// 批内失败处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchFailurePolicy {
    /// 任一条失败即整批失败，队列整批重投（已完成的条目也会重投）
    #[default]
    AbortBatch,
    /// 逐条成功、重试或进入死信
    IsolateItems,
}

/// 一批消息的处理结果（消息 id）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub accepted: bool,
    pub processed: Vec<String>,
    pub retry: Vec<String>,
    pub dead_lettered: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// 完成通知的 topic
    pub topic: String,
    pub policy: BatchFailurePolicy,
    /// 达到该投递次数仍失败的条目进入死信（仅 isolate-items）
    pub max_deliver: u32,
}

enum Decoded {
    Empty,
    Valid(WorkDescriptor),
    Malformed {
        event_id: Option<String>,
        reason: String,
    },
}

/// 处理层 worker
pub struct ProcessingWorker {
    store: DurableStore,
    status: Arc<dyn StatusStore>,
    bus: Arc<dyn NotificationBus>,
    clock: Arc<dyn Clock>,
    settings: WorkerSettings,
}

impl ProcessingWorker {
    pub fn new(
        store: DurableStore,
        status: Arc<dyn StatusStore>,
        bus: Arc<dyn NotificationBus>,
        clock: Arc<dyn Clock>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            status,
            bus,
            clock,
            settings,
        }
    }

    pub fn policy(&self) -> BatchFailurePolicy {
        self.settings.policy
    }

    pub async fn process_batch(
        &self,
        messages: Vec<QueueMessage>,
    ) -> Result<BatchOutcome, PipelineError> {
        info!(
            target: "pipeline.worker",
            event = events::WORKER_BATCH_START,
            batch_size = messages.len(),
            policy = ?self.settings.policy
        );

        let outcome = match self.settings.policy {
            BatchFailurePolicy::AbortBatch => self.process_abort_batch(&messages).await?,
            BatchFailurePolicy::IsolateItems => self.process_isolated(&messages).await,
        };

        info!(
            target: "pipeline.worker",
            event = events::WORKER_BATCH_COMPLETE,
            accepted = outcome.accepted,
            processed = outcome.processed.len(),
            retry = outcome.retry.len(),
            dead_lettered = outcome.dead_lettered.len(),
            skipped = outcome.skipped.len()
        );
        Ok(outcome)
    }

    /// 先整体校验，再顺序处理，任一条失败立即返回错误
    async fn process_abort_batch(
        &self,
        messages: &[QueueMessage],
    ) -> Result<BatchOutcome, PipelineError> {
        let mut outcome = BatchOutcome::default();
        let mut items = Vec::with_capacity(messages.len());

        for message in messages {
            match decode(message) {
                Decoded::Empty => {
                    skip_empty(message);
                    outcome.skipped.push(message.id.clone());
                }
                Decoded::Valid(descriptor) => items.push((message, descriptor)),
                Decoded::Malformed { event_id, reason } => {
                    warn!(
                        target: "pipeline.worker",
                        event = events::WORKER_BATCH_ABORTED,
                        message_id = %message.id,
                        reason = %reason,
                        "工作描述不合法，整批失败"
                    );
                    return Err(PipelineError::processing(
                        &message.id,
                        event_id.as_deref(),
                        ProcessStage::Decode,
                        anyhow::anyhow!(reason),
                    ));
                }
            }
        }

        for (message, descriptor) in items {
            if let Err(err) = self.process_descriptor(&message.id, &descriptor, true).await {
                // 之前的条目已提交，整批重投时会再次处理
                warn!(
                    target: "pipeline.worker",
                    event = events::WORKER_BATCH_ABORTED,
                    message_id = %message.id,
                    event_id = %descriptor.event_id,
                    committed = outcome.processed.len(),
                    error = %err
                );
                return Err(err);
            }
            outcome.processed.push(message.id.clone());
        }

        outcome.accepted = true;
        Ok(outcome)
    }

    async fn process_isolated(&self, messages: &[QueueMessage]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for message in messages {
            let descriptor = match decode(message) {
                Decoded::Empty => {
                    skip_empty(message);
                    outcome.skipped.push(message.id.clone());
                    continue;
                }
                Decoded::Malformed { event_id, reason } => {
                    self.dead_letter(message, event_id.as_deref(), &reason).await;
                    outcome.dead_lettered.push(message.id.clone());
                    continue;
                }
                Decoded::Valid(descriptor) => descriptor,
            };

            match self.process_descriptor(&message.id, &descriptor, false).await {
                Ok(()) => outcome.processed.push(message.id.clone()),
                Err(err) => {
                    let reason = format!("{:#}", err);
                    if is_permanent(&err) || message.delivery_attempt >= self.settings.max_deliver {
                        self.dead_letter(message, Some(&descriptor.event_id), &reason)
                            .await;
                        outcome.dead_lettered.push(message.id.clone());
                    } else {
                        warn!(
                            target: "pipeline.worker",
                            event = events::WORKER_ITEM_FAILED,
                            message_id = %message.id,
                            event_id = %descriptor.event_id,
                            attempt = message.delivery_attempt,
                            error = %reason,
                            "条目处理失败，等待重投"
                        );
                        outcome.retry.push(message.id.clone());
                    }
                }
            }
        }

        outcome.accepted = outcome.retry.is_empty() && outcome.dead_lettered.is_empty();
        outcome
    }

    /// 单条工作描述的处理流程
    ///
    /// `publish_is_fatal` 为 false 时通知失败只记录日志。
    async fn process_descriptor(
        &self,
        message_id: &str,
        descriptor: &WorkDescriptor,
        publish_is_fatal: bool,
    ) -> Result<(), PipelineError> {
        let event_id = descriptor.event_id.as_str();
        let fail = |stage: ProcessStage, source: anyhow::Error| {
            PipelineError::processing(message_id, Some(event_id), stage, source)
        };

        // 终态记录不再产生 silver 对象；真正的并发保护仍是后面的条件更新
        self.ensure_processable(event_id)
            .await
            .map_err(|e| fail(ProcessStage::UpdateStatus, e.into()))?;

        let raw = self
            .store
            .get(&descriptor.raw_location)
            .await
            .map_err(|e| fail(ProcessStage::FetchRaw, e))?;

        let processed_at = self.clock.now();
        let enriched = transform::enrich(&raw, event_id, &descriptor.event_type, processed_at)
            .map_err(|e| fail(ProcessStage::Transform, e))?;

        let processed_key = paths::processed_key(&descriptor.event_type, event_id);
        let processed_location = self
            .store
            .put(
                Namespace::Processed,
                &processed_key,
                &enriched,
                CONTENT_TYPE_JSON,
            )
            .await
            .map_err(|e| fail(ProcessStage::PersistProcessed, e))?;

        self.status
            .update(
                event_id,
                &StatusUpdate::processed(processed_at, processed_location.clone()),
            )
            .await
            .map_err(|e| fail(ProcessStage::UpdateStatus, e.into()))?;

        let notice = CompletionNotice::new(
            descriptor,
            processed_location.clone(),
            format_timestamp(processed_at),
        );
        if let Err(err) = self.bus.publish(&self.settings.topic, &notice).await {
            if publish_is_fatal {
                return Err(fail(ProcessStage::Publish, err));
            }
            warn!(
                target: "pipeline.worker",
                event = events::NOTIFY_FAILED,
                message_id = %message_id,
                event_id = %event_id,
                topic = %self.settings.topic,
                error = %format!("{:#}", err)
            );
        }

        info!(
            target: "pipeline.worker",
            event = events::WORKER_ITEM_PROCESSED,
            message_id = %message_id,
            event_id = %event_id,
            event_type = %descriptor.event_type,
            processed = %processed_location
        );
        Ok(())
    }

    async fn ensure_processable(&self, event_id: &str) -> Result<(), StatusStoreError> {
        let record = self
            .status
            .get(event_id)
            .await?
            .ok_or_else(|| StatusStoreError::NotFound(event_id.to_string()))?;
        if record.status.can_transition_to(EventStatus::Processed) {
            Ok(())
        } else {
            Err(StatusStoreError::InvalidTransition {
                event_id: event_id.to_string(),
                from: record.status,
                to: EventStatus::Processed,
            })
        }
    }

    /// 死信：有状态记录时标记 FAILED，消息由队列终止
    async fn dead_letter(&self, message: &QueueMessage, event_id: Option<&str>, reason: &str) {
        error!(
            target: "pipeline.worker",
            event = events::WORKER_DEAD_LETTER,
            message_id = %message.id,
            event_id = event_id.unwrap_or(""),
            attempt = message.delivery_attempt,
            reason = %reason
        );

        let Some(event_id) = event_id.filter(|id| !id.trim().is_empty()) else {
            return;
        };
        match self
            .status
            .update(event_id, &StatusUpdate::failed(reason))
            .await
        {
            Ok(_) => {}
            Err(StatusStoreError::NotFound(_)) => {}
            Err(err) => warn!(
                target: "pipeline.worker",
                message_id = %message.id,
                event_id = %event_id,
                error = %err,
                "死信条目无法标记为 FAILED"
            ),
        }
    }
}

#[async_trait]
impl BatchHandler for ProcessingWorker {
    async fn handle_batch(
        &self,
        messages: Vec<QueueMessage>,
    ) -> Result<BatchOutcome, PipelineError> {
        self.process_batch(messages).await
    }
}

fn decode(message: &QueueMessage) -> Decoded {
    if message.body.iter().all(u8::is_ascii_whitespace) {
        return Decoded::Empty;
    }

    let value: Value = match serde_json::from_slice(&message.body) {
        Ok(value) => value,
        Err(e) => {
            return Decoded::Malformed {
                event_id: None,
                reason: format!("message body is not valid JSON: {}", e),
            }
        }
    };
    let event_id = value
        .get("eventId")
        .and_then(Value::as_str)
        .map(str::to_string);

    match serde_json::from_value::<WorkDescriptor>(value) {
        Ok(descriptor) => {
            let missing = descriptor.missing_fields();
            if missing.is_empty() {
                Decoded::Valid(descriptor)
            } else {
                Decoded::Malformed {
                    event_id,
                    reason: format!("invalid work item, missing {}", missing.join(", ")),
                }
            }
        }
        Err(e) => Decoded::Malformed {
            event_id,
            reason: format!("invalid work item: {}", e),
        },
    }
}

fn skip_empty(message: &QueueMessage) {
    warn!(
        target: "pipeline.worker",
        event = events::WORKER_ITEM_SKIPPED,
        message_id = %message.id,
        "消息体为空，跳过"
    );
}

/// 重投也无法恢复的失败
fn is_permanent(err: &PipelineError) -> bool {
    let PipelineError::Processing { stage, source, .. } = err else {
        return false;
    };
    match stage {
        ProcessStage::Decode | ProcessStage::Transform => true,
        ProcessStage::FetchRaw => source.downcast_ref::<ObjectMissing>().is_some(),
        ProcessStage::UpdateStatus => matches!(
            source.downcast_ref::<StatusStoreError>(),
            Some(StatusStoreError::NotFound(_)) | Some(StatusStoreError::InvalidTransition { .. })
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStatusStore;
    use crate::model::{ObjectLocation, StatusRecord};
    use crate::pipeline::clock::FixedClock;
    use crate::pipeline::intake::IntakeService;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::Storage;
    use crate::util::notification::MemoryNotificationBus;
    use crate::util::task_queue::MemoryWorkQueue;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const TOPIC: &str = "edcp-events";

    struct Fixture {
        intake: IntakeService,
        raw: Arc<MemoryStorage>,
        processed: Arc<MemoryStorage>,
        status: Arc<MemoryStatusStore>,
        queue: Arc<MemoryWorkQueue>,
        bus: Arc<MemoryNotificationBus>,
        clock: Arc<FixedClock>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let raw = Arc::new(MemoryStorage::new("bronze"));
        let processed = Arc::new(MemoryStorage::new("silver"));
        let clock = Arc::new(FixedClock::new(start()));
        let status = Arc::new(MemoryStatusStore::with_clock(clock.clone()));
        let queue = Arc::new(MemoryWorkQueue::new());
        let bus = Arc::new(MemoryNotificationBus::new());
        let intake = IntakeService::new(
            DurableStore::new(raw.clone(), processed.clone()),
            status.clone(),
            queue.clone(),
            clock.clone(),
        );
        Fixture {
            intake,
            raw,
            processed,
            status,
            queue,
            bus,
            clock,
        }
    }

    impl Fixture {
        fn worker(&self, policy: BatchFailurePolicy) -> ProcessingWorker {
            ProcessingWorker::new(
                DurableStore::new(self.raw.clone(), self.processed.clone()),
                self.status.clone(),
                self.bus.clone(),
                self.clock.clone(),
                WorkerSettings {
                    topic: TOPIC.to_string(),
                    policy,
                    max_deliver: 3,
                },
            )
        }
    }

    fn malformed(id: &str) -> QueueMessage {
        QueueMessage::new(id, br#"{"eventType":"order.created"}"#.to_vec())
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let f = fixture();
        let accepted = f
            .intake
            .submit(br#"{"eventType":"order.created","amount":42}"#)
            .await
            .unwrap();
        let id = accepted.event_id.clone();

        let raw_key = format!("raw/order.created/{}.json", id);
        assert!(f.raw.object(&raw_key).is_some());
        assert_eq!(
            f.status.get(&id).await.unwrap().unwrap().status,
            EventStatus::Enqueued
        );

        f.clock.advance(Duration::seconds(5));
        let worker = f.worker(BatchFailurePolicy::AbortBatch);
        let outcome = worker.process_batch(f.queue.drain_messages()).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.processed, vec!["m-1".to_string()]);

        let processed_key = format!("silver/order.created/{}.json", id);
        let object = f.processed.object(&processed_key).unwrap();
        let value: Value = serde_json::from_slice(&object.data).unwrap();
        assert_eq!(value["amount"], 42);
        assert_eq!(value["eventId"], id.as_str());
        assert_eq!(value["eventType"], "order.created");
        assert_eq!(value["processedAt"], "2024-05-01T12:00:05.000Z");
        assert_eq!(value["source"], "worker");

        let record = f.status.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Processed);
        assert_eq!(record.processed_at, Some(start() + Duration::seconds(5)));
        assert_eq!(
            record.processed_location,
            Some(ObjectLocation::new("silver", processed_key.clone()))
        );

        let published = f.bus.published();
        assert_eq!(published.len(), 1);
        let (topic, notice) = &published[0];
        assert_eq!(topic, TOPIC);
        assert_eq!(notice.event_id, id);
        assert_eq!(notice.source, "edcp.worker");
        assert_eq!(notice.detail_type, "EventProcessed");
        assert_eq!(notice.raw, ObjectLocation::new("bronze", raw_key));
        assert_eq!(notice.processed, ObjectLocation::new("silver", processed_key));
        assert_eq!(notice.processed_at, "2024-05-01T12:00:05.000Z");
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let f = fixture();
        let accepted = f
            .intake
            .submit(br#"{"eventType":"order.created","amount":42}"#)
            .await
            .unwrap();
        let messages = f.queue.drain_messages();
        let worker = f.worker(BatchFailurePolicy::AbortBatch);

        worker.process_batch(messages.clone()).await.unwrap();
        let key = format!("silver/order.created/{}.json", accepted.event_id);
        let first = f.processed.object(&key).unwrap().data;

        // 同一时刻重投，输出逐字节一致
        worker.process_batch(messages.clone()).await.unwrap();
        assert_eq!(f.processed.object(&key).unwrap().data, first);

        // 不同时刻重投，只有 processedAt 不同
        f.clock.advance(Duration::minutes(1));
        let redelivered: Vec<QueueMessage> =
            messages.into_iter().map(|m| m.with_attempt(3)).collect();
        worker.process_batch(redelivered).await.unwrap();
        let mut third: Value = serde_json::from_slice(&f.processed.object(&key).unwrap().data).unwrap();
        let mut original: Value = serde_json::from_slice(&first).unwrap();
        assert_ne!(third["processedAt"], original["processedAt"]);
        third.as_object_mut().unwrap().remove("processedAt");
        original.as_object_mut().unwrap().remove("processedAt");
        assert_eq!(third, original);

        assert_eq!(f.processed.keys(), vec![key]);
        assert_eq!(f.status.len(), 1);
        assert_eq!(
            f.status.get(&accepted.event_id).await.unwrap().unwrap().status,
            EventStatus::Processed
        );
    }

    #[tokio::test]
    async fn test_abort_batch_with_malformed_descriptor() {
        let f = fixture();
        let first = f.intake.submit(br#"{"eventType":"a"}"#).await.unwrap();
        let third = f.intake.submit(br#"{"eventType":"c"}"#).await.unwrap();
        let mut drained = f.queue.drain_messages();
        let messages = vec![drained.remove(0), malformed("bad"), drained.remove(0)];

        let err = f
            .worker(BatchFailurePolicy::AbortBatch)
            .process_batch(messages)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Processing {
                stage: ProcessStage::Decode,
                ref message_id,
                ..
            } if message_id == "bad"
        ));

        for id in [&first.event_id, &third.event_id] {
            assert_eq!(
                f.status.get(id).await.unwrap().unwrap().status,
                EventStatus::Enqueued
            );
        }
        assert!(f.processed.is_empty());
        assert!(f.bus.published().is_empty());
    }

    /// 整批失败不回滚已完成的条目，重投时会重复处理
    #[tokio::test]
    async fn test_abort_batch_leaves_earlier_items_committed() {
        let f = fixture();
        let first = f.intake.submit(br#"{"eventType":"a"}"#).await.unwrap();
        let second = f.intake.submit(br#"{"eventType":"b"}"#).await.unwrap();
        let third = f.intake.submit(br#"{"eventType":"c"}"#).await.unwrap();
        let messages = f.queue.drain_messages();

        // 第二条的原始对象丢失
        let second_raw = format!("raw/b/{}.json", second.event_id);
        f.raw.delete(&second_raw).await.unwrap();

        let err = f
            .worker(BatchFailurePolicy::AbortBatch)
            .process_batch(messages.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Processing {
                stage: ProcessStage::FetchRaw,
                ..
            }
        ));

        assert_eq!(
            f.status.get(&first.event_id).await.unwrap().unwrap().status,
            EventStatus::Processed
        );
        assert_eq!(
            f.status.get(&second.event_id).await.unwrap().unwrap().status,
            EventStatus::Enqueued
        );
        assert_eq!(
            f.status.get(&third.event_id).await.unwrap().unwrap().status,
            EventStatus::Enqueued
        );
        assert_eq!(f.bus.published().len(), 1);

        // 整批重投，第一条被再次处理并再次通知
        let _ = f
            .worker(BatchFailurePolicy::AbortBatch)
            .process_batch(messages)
            .await;
        assert_eq!(f.bus.published().len(), 2);
        assert_eq!(f.bus.published()[1].1.event_id, first.event_id);
    }

    #[tokio::test]
    async fn test_abort_batch_publish_failure_is_fatal() {
        let f = fixture();
        f.intake.submit(br#"{"eventType":"a"}"#).await.unwrap();
        f.bus.set_fail(true);
        let err = f
            .worker(BatchFailurePolicy::AbortBatch)
            .process_batch(f.queue.drain_messages())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Processing {
                stage: ProcessStage::Publish,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_isolate_items() {
        let f = fixture();
        let ok = f.intake.submit(br#"{"eventType":"a"}"#).await.unwrap();
        let lost = f.intake.submit(br#"{"eventType":"b"}"#).await.unwrap();
        let mut messages = f.queue.drain_messages();
        messages.insert(1, malformed("bad"));
        messages.push(QueueMessage::new("empty", Vec::new()));
        f.raw
            .delete(&format!("raw/b/{}.json", lost.event_id))
            .await
            .unwrap();

        let outcome = f
            .worker(BatchFailurePolicy::IsolateItems)
            .process_batch(messages)
            .await
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.processed, vec!["m-1".to_string()]);
        assert_eq!(outcome.dead_lettered, vec!["bad".to_string(), "m-2".to_string()]);
        assert_eq!(outcome.skipped, vec!["empty".to_string()]);
        assert!(outcome.retry.is_empty());

        assert_eq!(
            f.status.get(&ok.event_id).await.unwrap().unwrap().status,
            EventStatus::Processed
        );
        let failed = f.status.get(&lost.event_id).await.unwrap().unwrap();
        assert_eq!(failed.status, EventStatus::Failed);
        assert!(failed.failure_reason.unwrap().contains("object not found"));
    }

    #[tokio::test]
    async fn test_isolate_items_retries_then_dead_letters() {
        let f = fixture();
        let accepted = f.intake.submit(br#"{"eventType":"a"}"#).await.unwrap();
        let message = f.queue.drain_messages().remove(0);
        f.processed.set_fail_writes(true);
        let worker = f.worker(BatchFailurePolicy::IsolateItems);

        let outcome = worker.process_batch(vec![message.clone()]).await.unwrap();
        assert_eq!(outcome.retry, vec!["m-1".to_string()]);
        assert_eq!(
            f.status.get(&accepted.event_id).await.unwrap().unwrap().status,
            EventStatus::Enqueued
        );

        let outcome = worker
            .process_batch(vec![message.with_attempt(3)])
            .await
            .unwrap();
        assert_eq!(outcome.dead_lettered, vec!["m-1".to_string()]);
        assert_eq!(
            f.status.get(&accepted.event_id).await.unwrap().unwrap().status,
            EventStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_isolate_items_publish_failure_is_not_fatal() {
        let f = fixture();
        let accepted = f.intake.submit(br#"{"eventType":"a"}"#).await.unwrap();
        f.bus.set_fail(true);
        let outcome = f
            .worker(BatchFailurePolicy::IsolateItems)
            .process_batch(f.queue.drain_messages())
            .await
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(
            f.status.get(&accepted.event_id).await.unwrap().unwrap().status,
            EventStatus::Processed
        );
    }

    #[tokio::test]
    async fn test_failed_event_is_not_reprocessed() {
        let f = fixture();
        let record = StatusRecord::enqueued(
            "e-9",
            "a",
            ObjectLocation::new("bronze", "raw/a/e-9.json"),
            start(),
        );
        f.status.create(&record).await.unwrap();
        f.raw
            .put("raw/a/e-9.json", br#"{"eventType":"a"}"#, CONTENT_TYPE_JSON)
            .await
            .unwrap();
        f.status
            .update("e-9", &StatusUpdate::failed("operator"))
            .await
            .unwrap();

        let body = serde_json::to_vec(&WorkDescriptor::new(
            "e-9",
            "a",
            ObjectLocation::new("bronze", "raw/a/e-9.json"),
        ))
        .unwrap();
        let outcome = f
            .worker(BatchFailurePolicy::IsolateItems)
            .process_batch(vec![QueueMessage::new("m-9", body)])
            .await
            .unwrap();
        assert_eq!(outcome.dead_lettered, vec!["m-9".to_string()]);
        let stored = f.status.get("e-9").await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("operator"));
        assert!(f.processed.is_empty());
        assert!(f.bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_failed_submitted_event_writes_no_silver_object() {
        let f = fixture();
        let accepted = f.intake.submit(br#"{"eventType":"a"}"#).await.unwrap();
        f.status
            .update(&accepted.event_id, &StatusUpdate::failed("rejected upstream"))
            .await
            .unwrap();

        let outcome = f
            .worker(BatchFailurePolicy::IsolateItems)
            .process_batch(f.queue.drain_messages())
            .await
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.dead_lettered, vec!["m-1".to_string()]);
        assert_eq!(
            f.status.get(&accepted.event_id).await.unwrap().unwrap().status,
            EventStatus::Failed
        );
        assert!(f.processed.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_is_rejected_before_writes() {
        let f = fixture();
        f.raw
            .put("raw/a/ghost.json", br#"{"eventType":"a"}"#, CONTENT_TYPE_JSON)
            .await
            .unwrap();
        let body = serde_json::to_vec(&WorkDescriptor::new(
            "ghost",
            "a",
            ObjectLocation::new("bronze", "raw/a/ghost.json"),
        ))
        .unwrap();

        let err = f
            .worker(BatchFailurePolicy::AbortBatch)
            .process_batch(vec![QueueMessage::new("m-1", body)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Processing {
                stage: ProcessStage::UpdateStatus,
                ..
            }
        ));
        assert!(f.processed.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_delivery_of_same_event() {
        let f = fixture();
        let accepted = f
            .intake
            .submit(br#"{"eventType":"order.created","amount":7}"#)
            .await
            .unwrap();
        let messages = f.queue.drain_messages();
        let first = f.worker(BatchFailurePolicy::AbortBatch);
        let second = f.worker(BatchFailurePolicy::AbortBatch);

        let (a, b) = tokio::join!(
            first.process_batch(messages.clone()),
            second.process_batch(messages.clone())
        );
        assert!(a.unwrap().accepted);
        assert!(b.unwrap().accepted);

        let key = format!("silver/order.created/{}.json", accepted.event_id);
        assert_eq!(f.processed.keys(), vec![key.clone()]);
        assert_eq!(f.status.len(), 1);
        let record = f.status.get(&accepted.event_id).await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Processed);
        assert_eq!(
            record.processed_location,
            Some(ObjectLocation::new("silver", key))
        );
        assert_eq!(f.bus.published().len(), 2);
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome = BatchOutcome {
            accepted: true,
            processed: vec!["m-1".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["accepted"], true);
        assert_eq!(json["deadLettered"], serde_json::json!([]));
        assert_eq!(
            serde_json::from_str::<BatchFailurePolicy>("\"isolate-items\"").unwrap(),
            BatchFailurePolicy::IsolateItems
        );
    }
}
