use axum::http::StatusCode;
use std::fmt;

/// 接入阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    PersistRaw,
    CreateStatus,
    Enqueue,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::PersistRaw => "persist_raw",
            IngestStage::CreateStatus => "create_status",
            IngestStage::Enqueue => "enqueue",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStage {
    Decode,
    FetchRaw,
    Transform,
    PersistProcessed,
    UpdateStatus,
    Publish,
}

impl ProcessStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStage::Decode => "decode",
            ProcessStage::FetchRaw => "fetch_raw",
            ProcessStage::Transform => "transform",
            ProcessStage::PersistProcessed => "persist_processed",
            ProcessStage::UpdateStatus => "update_status",
            ProcessStage::Publish => "publish",
        }
    }
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 管道错误分类
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 输入不合法，对调用方可见
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 缺少必需的部署参数，启动即失败
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 接入阶段下游调用失败，之前的副作用可能已提交
    #[error("ingestion failed at {stage}: {source:#}")]
    Ingestion {
        stage: IngestStage,
        #[source]
        source: anyhow::Error,
    },

    /// 处理某条工作描述失败
    #[error("processing failed for message {message_id} at {stage}: {source:#}")]
    Processing {
        message_id: String,
        event_id: Option<String>,
        stage: ProcessStage,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn ingestion(stage: IngestStage, source: impl Into<anyhow::Error>) -> Self {
        PipelineError::Ingestion {
            stage,
            source: source.into(),
        }
    }

    pub fn processing(
        message_id: &str,
        event_id: Option<&str>,
        stage: ProcessStage,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        PipelineError::Processing {
            message_id: message_id.to_string(),
            event_id: event_id.map(str::to_string),
            stage,
            source: source.into(),
        }
    }

    /// 对外 HTTP 状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 对外错误消息，下游失败统一使用通用描述
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::InvalidInput(message) => message.clone(),
            _ => "Failed to ingest event".to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Ingestion { .. } => "ingestion",
            PipelineError::Processing { .. } => "processing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            PipelineError::InvalidInput("eventType is required".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        let err = PipelineError::ingestion(IngestStage::Enqueue, anyhow::anyhow!("queue down"));
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Failed to ingest event");
        assert!(err.to_string().contains("enqueue"));
        assert!(err.to_string().contains("queue down"));
    }

    #[test]
    fn test_processing_error_carries_identity() {
        let err = PipelineError::processing(
            "m-7",
            Some("e-1"),
            ProcessStage::FetchRaw,
            anyhow::anyhow!("missing"),
        );
        match &err {
            PipelineError::Processing {
                message_id,
                event_id,
                stage,
                ..
            } => {
                assert_eq!(message_id, "m-7");
                assert_eq!(event_id.as_deref(), Some("e-1"));
                assert_eq!(*stage, ProcessStage::FetchRaw);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), "processing");
    }
}
