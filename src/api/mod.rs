mod events;

use crate::util::config::ServerConfig;
use crate::util::log::ACCESS_TARGET;
use crate::util::logging::standards::events as log_events;
use crate::AppState;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// 创建CORS配置
fn create_cors_layer() -> CorsLayer {
    // 从环境变量读取允许的域名，默认为本地开发
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:8964,http://127.0.0.1:8964".to_string());

    CorsLayer::new()
        .allow_origin(
            allowed_origins
                .split(',')
                .filter_map(|s| match s.trim().parse() {
                    Ok(origin) => Some(origin),
                    Err(e) => {
                        warn!("无效的CORS源: {} - {}", s, e);
                        None
                    }
                })
                .collect::<Vec<_>>(),
        )
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
}

pub fn routes(app_state: AppState, server: &ServerConfig) -> Router {
    let timeout_secs = if server.request_timeout_secs == 0 {
        30
    } else {
        server.request_timeout_secs
    };

    Router::new()
        .route("/events", post(events::submit_event))
        .route("/events/:event_id", get(events::get_event_status))
        .route("/health", get(events::health_check))
        .with_state(app_state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs)))
        .layer(from_fn(request_logging_middleware))
        .layer(create_cors_layer())
}

/// 访问日志中间件
async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            target: ACCESS_TARGET,
            event = log_events::REQUEST_ERROR,
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64
        );
    } else if path == "/health" {
        tracing::debug!(
            target: ACCESS_TARGET,
            event = log_events::REQUEST_COMPLETE,
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64
        );
    } else {
        info!(
            target: ACCESS_TARGET,
            event = log_events::REQUEST_COMPLETE,
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStatusStore, StatusStore};
    use crate::model::{EventStatus, ObjectLocation, StatusRecord};
    use crate::pipeline::{IntakeService, SystemClock};
    use crate::storage::memory::MemoryStorage;
    use crate::storage::DurableStore;
    use crate::util::config::DeploymentRole;
    use crate::util::task_queue::{MemoryWorkQueue, WorkQueue};
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        raw: Arc<MemoryStorage>,
        status: Arc<MemoryStatusStore>,
        queue: Arc<MemoryWorkQueue>,
    }

    fn harness(intake_enabled: bool) -> Harness {
        let raw = Arc::new(MemoryStorage::new("bronze"));
        let processed = Arc::new(MemoryStorage::new("silver"));
        let status = Arc::new(MemoryStatusStore::new());
        let queue = Arc::new(MemoryWorkQueue::new());
        let store = DurableStore::new(raw.clone(), processed);
        let intake = intake_enabled.then(|| {
            IntakeService::new(
                store.clone(),
                status.clone(),
                queue.clone(),
                Arc::new(SystemClock),
            )
        });
        let state = AppState {
            intake,
            status: status.clone(),
            store,
            queue: Some(queue.clone() as Arc<dyn WorkQueue>),
            role: DeploymentRole::Standalone,
        };
        let server = ServerConfig {
            max_body_bytes: 1024,
            ..ServerConfig::default()
        };
        Harness {
            router: routes(state, &server),
            raw,
            status,
            queue,
        }
    }

    fn post_events(body: impl Into<Body>) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_event_accepted() {
        let h = harness(true);
        let response = h
            .router
            .oneshot(post_events(r#"{"eventType":"order.created","id":7}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = read_json(response).await;
        assert_eq!(json["status"], "accepted");
        let event_id = json["eventId"].as_str().unwrap().to_string();

        assert_eq!(h.raw.len(), 1);
        assert_eq!(h.queue.len(), 1);
        let record = h.status.get(&event_id).await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Enqueued);
    }

    #[tokio::test]
    async fn test_post_event_invalid_input() {
        let h = harness(true);
        for body in [r#"{"foo":1}"#, "not json", r#"{"eventType":""}"#] {
            let response = h.router.clone().oneshot(post_events(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = read_json(response).await;
            assert_eq!(json["status"], "error");
            assert!(json["message"].as_str().unwrap().len() > 0);
        }
        assert!(h.raw.is_empty());
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_post_event_downstream_failure_is_opaque() {
        let h = harness(true);
        h.queue.set_fail(true);
        let response = h
            .router
            .oneshot(post_events(r#"{"eventType":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = read_json(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Failed to ingest event");
    }

    #[tokio::test]
    async fn test_post_event_body_limit() {
        let h = harness(true);
        let big = format!(r#"{{"eventType":"ping","pad":"{}"}}"#, "x".repeat(4096));
        let response = h.router.oneshot(post_events(big)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(h.raw.is_empty());
    }

    #[tokio::test]
    async fn test_post_event_without_intake() {
        let h = harness(false);
        let response = h
            .router
            .oneshot(post_events(r#"{"eventType":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_event_status() {
        let h = harness(true);
        let record = StatusRecord::enqueued(
            "evt-9",
            "ping",
            ObjectLocation::new("bronze", "raw/ping/evt-9.json"),
            Utc::now(),
        );
        h.status.create(&record).await.unwrap();

        let response = h
            .router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/events/evt-9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["eventId"], "evt-9");
        assert_eq!(json["status"], "ENQUEUED");

        let response = h
            .router
            .oneshot(
                HttpRequest::builder()
                    .uri("/events/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(true);
        let response = h
            .router
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["role"], "standalone");
        let names: Vec<&str> = json["components"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["status_store", "storage", "queue"]);
    }
}
