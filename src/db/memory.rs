use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::traits::{StatusStore, StatusStoreError, StatusStoreResult};
use crate::model::{StatusRecord, StatusUpdate};
use crate::pipeline::clock::{Clock, SystemClock};

/// 内存状态存储
///
/// 迁移校验与写入在同一把锁内完成，与 SQLite 条件更新语义一致。
pub struct MemoryStatusStore {
    records: Mutex<HashMap<String, StatusRecord>>,
    clock: Arc<dyn Clock>,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            fail_creates: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// 注入创建失败
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// 注入更新失败
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<StatusRecord> {
        let mut records: Vec<StatusRecord> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        records
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn create(&self, record: &StatusRecord) -> StatusStoreResult<()> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected create failure for {}", record.event_id).into());
        }

        let mut records = self.records.lock();
        if records.contains_key(&record.event_id) {
            return Err(StatusStoreError::AlreadyExists(record.event_id.clone()));
        }
        records.insert(record.event_id.clone(), record.clone());
        Ok(())
    }

    async fn update(
        &self,
        event_id: &str,
        update: &StatusUpdate,
    ) -> StatusStoreResult<StatusRecord> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected update failure for {}", event_id).into());
        }

        let mut records = self.records.lock();
        let record = records
            .get_mut(event_id)
            .ok_or_else(|| StatusStoreError::NotFound(event_id.to_string()))?;

        if !record.status.can_transition_to(update.status) {
            return Err(StatusStoreError::InvalidTransition {
                event_id: event_id.to_string(),
                from: record.status,
                to: update.status,
            });
        }

        record.apply(update, self.clock.now());
        Ok(record.clone())
    }

    async fn get(&self, event_id: &str) -> StatusStoreResult<Option<StatusRecord>> {
        Ok(self.records.lock().get(event_id).cloned())
    }

    async fn health_check(&self) -> StatusStoreResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventStatus, ObjectLocation};
    use crate::pipeline::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    fn record(event_id: &str) -> StatusRecord {
        StatusRecord::enqueued(
            event_id,
            "order.created",
            ObjectLocation::new("bronze", format!("raw/order.created/{}.json", event_id)),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let store = MemoryStatusStore::new();
        store.create(&record("e-1")).await.unwrap();
        let err = store.create(&record("e-1")).await.unwrap_err();
        assert!(matches!(err, StatusStoreError::AlreadyExists(id) if id == "e-1"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_enforces_state_machine() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 5).unwrap();
        let store = MemoryStatusStore::with_clock(Arc::new(FixedClock::new(now)));
        store.create(&record("e-1")).await.unwrap();

        let processed = ObjectLocation::new("silver", "silver/order.created/e-1.json");
        let updated = store
            .update("e-1", &StatusUpdate::processed(now, processed.clone()))
            .await
            .unwrap();
        assert_eq!(updated.status, EventStatus::Processed);
        assert_eq!(updated.processed_location, Some(processed.clone()));
        assert_eq!(updated.updated_at, now);

        // 重复投递
        store
            .update("e-1", &StatusUpdate::processed(now, processed))
            .await
            .unwrap();

        let err = store
            .update("e-1", &StatusUpdate::failed("late failure"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StatusStoreError::InvalidTransition {
                from: EventStatus::Processed,
                to: EventStatus::Failed,
                ..
            }
        ));
        let stored = store.get("e-1").await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Processed);
        assert!(stored.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_failed_is_terminal() {
        let store = MemoryStatusStore::new();
        store.create(&record("e-2")).await.unwrap();
        store
            .update("e-2", &StatusUpdate::failed("raw object missing"))
            .await
            .unwrap();

        let err = store
            .update(
                "e-2",
                &StatusUpdate::processed(Utc::now(), ObjectLocation::new("silver", "k")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StatusStoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_update_unknown_event() {
        let store = MemoryStatusStore::new();
        let err = store
            .update("missing", &StatusUpdate::failed("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StatusStoreError::NotFound(_)));
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
