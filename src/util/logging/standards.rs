//! Centralised logging metadata (event names, shared keys, etc.).

/// Canonical event names used across the service.
pub mod events {
    /// HTTP request lifecycle.
    pub const REQUEST_COMPLETE: &str = "request.complete";
    pub const REQUEST_ERROR: &str = "request.error";

    /// 接入阶段。
    pub const EVENT_ACCEPTED: &str = "event.accepted";
    pub const EVENT_REJECTED: &str = "event.rejected";
    pub const EVENT_INGEST_FAILED: &str = "event.ingest_failed";

    /// 处理阶段。
    pub const WORKER_BATCH_START: &str = "worker.batch_start";
    pub const WORKER_BATCH_COMPLETE: &str = "worker.batch_complete";
    pub const WORKER_BATCH_ABORTED: &str = "worker.batch_aborted";
    pub const WORKER_ITEM_PROCESSED: &str = "worker.item_processed";
    pub const WORKER_ITEM_FAILED: &str = "worker.item_failed";
    pub const WORKER_ITEM_SKIPPED: &str = "worker.item_skipped";
    pub const WORKER_DEAD_LETTER: &str = "worker.dead_letter";

    /// 队列与通知。
    pub const QUEUE_ENQUEUE: &str = "queue.enqueue";
    pub const QUEUE_DEQUEUE: &str = "queue.dequeue";
    pub const QUEUE_REDELIVER: &str = "queue.redeliver";
    pub const NOTIFY_PUBLISHED: &str = "notify.published";
    pub const NOTIFY_FAILED: &str = "notify.failed";
}
