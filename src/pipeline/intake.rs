use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::error::{IngestStage, PipelineError};
use super::paths;
use crate::db::StatusStore;
use crate::model::{StatusRecord, WorkDescriptor};
use crate::storage::{DurableStore, Namespace, CONTENT_TYPE_JSON};
use crate::util::logging::standards::events;
use crate::util::task_queue::WorkQueue;

/// 接入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub event_id: String,
}

/// 事件接入服务
///
/// 无内部可变状态，可任意并发调用。
#[derive(Clone)]
pub struct IntakeService {
    store: DurableStore,
    status: Arc<dyn StatusStore>,
    queue: Arc<dyn WorkQueue>,
    clock: Arc<dyn Clock>,
}

impl IntakeService {
    pub fn new(
        store: DurableStore,
        status: Arc<dyn StatusStore>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            status,
            queue,
            clock,
        }
    }

    /// 校验、落盘、登记状态、入队，全部完成后才返回成功
    ///
    /// 任一步失败都返回 `Ingestion`，此前已提交的副作用不会回滚。
    pub async fn submit(&self, body: &[u8]) -> Result<Accepted, PipelineError> {
        let event_type = match extract_event_type(body) {
            Ok(event_type) => event_type,
            Err(err) => {
                warn!(
                    target: "pipeline.intake",
                    event = events::EVENT_REJECTED,
                    reason = %err
                );
                return Err(err);
            }
        };

        let event_id = Uuid::new_v4().to_string();
        let raw_key = paths::raw_key(&event_type, &event_id);

        let raw_location = self
            .store
            .put(Namespace::Raw, &raw_key, body, CONTENT_TYPE_JSON)
            .await
            .map_err(|e| self.fail(&event_id, IngestStage::PersistRaw, e))?;

        let record = StatusRecord::enqueued(
            &event_id,
            &event_type,
            raw_location.clone(),
            self.clock.now(),
        );
        self.status
            .create(&record)
            .await
            .map_err(|e| self.fail(&event_id, IngestStage::CreateStatus, e))?;

        let descriptor = WorkDescriptor::new(&event_id, &event_type, raw_location);
        self.queue
            .enqueue(&descriptor)
            .await
            .map_err(|e| self.fail(&event_id, IngestStage::Enqueue, e))?;

        info!(
            target: "pipeline.intake",
            event = events::EVENT_ACCEPTED,
            event_id = %event_id,
            event_type = %event_type,
            raw = %descriptor.raw_location,
            queue = self.queue.driver()
        );

        Ok(Accepted { event_id })
    }

    fn fail(
        &self,
        event_id: &str,
        stage: IngestStage,
        source: impl Into<anyhow::Error>,
    ) -> PipelineError {
        let source = source.into();
        error!(
            target: "pipeline.intake",
            event = events::EVENT_INGEST_FAILED,
            event_id = %event_id,
            stage = %stage,
            error = %format!("{:#}", source)
        );
        PipelineError::ingestion(stage, source)
    }
}

/// 负载必须是带非空字符串 `eventType` 的 JSON 对象
fn extract_event_type(body: &[u8]) -> Result<String, PipelineError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PipelineError::InvalidInput(format!("Request body is not valid JSON: {}", e)))?;

    match value.get("eventType") {
        Some(Value::String(event_type)) if !event_type.trim().is_empty() => Ok(event_type.clone()),
        Some(Value::String(_)) => Err(PipelineError::InvalidInput(
            "eventType must not be empty".to_string(),
        )),
        Some(_) => Err(PipelineError::InvalidInput(
            "eventType must be a string".to_string(),
        )),
        None => Err(PipelineError::InvalidInput(
            "eventType is required".to_string(),
        )),
    }
}
