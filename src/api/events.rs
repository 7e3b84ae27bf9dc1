use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use std::time::Instant;
use tracing::{error, warn};

use crate::build_info;
use crate::model::{AcceptedResponse, ComponentStatus, ErrorResponse, HealthStatus};
use crate::AppState;

/// POST /events
///
/// 成功返回 202；负载不合法 400；下游能力失败 500 且不暴露内部细节。
pub async fn submit_event(State(app_state): State<AppState>, body: Bytes) -> Response {
    let Some(intake) = app_state.intake.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Event intake is not enabled on this node")),
        )
            .into_response();
    };

    match intake.submit(&body).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse::new(accepted.event_id)),
        )
            .into_response(),
        Err(err) => (
            err.http_status(),
            Json(ErrorResponse::new(err.public_message())),
        )
            .into_response(),
    }
}

/// GET /events/:event_id
pub async fn get_event_status(
    State(app_state): State<AppState>,
    Path(event_id): Path<String>,
) -> Response {
    if event_id.is_empty() || event_id.len() > 128 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid event id")),
        )
            .into_response();
    }

    match app_state.status.get(&event_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Event {} not found", event_id))),
        )
            .into_response(),
        Err(e) => {
            error!(target: "api.events", event_id = %event_id, error = %e, "查询事件状态失败");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to load event status")),
            )
                .into_response()
        }
    }
}

/// GET /health
pub async fn health_check(State(app_state): State<AppState>) -> Response {
    let mut components = Vec::new();

    let started = Instant::now();
    let status_result = app_state.status.health_check().await.map_err(anyhow::Error::from);
    components.push(component("status_store", status_result, started));

    let started = Instant::now();
    let storage_result = app_state.store.health_check().await;
    components.push(component("storage", storage_result, started));

    if let Some(queue) = app_state.queue.as_ref() {
        let started = Instant::now();
        let queue_result = queue.health_check().await;
        let mut status = component("queue", queue_result, started);
        if status.details.is_none() {
            status.details = Some(queue.driver().to_string());
        }
        components.push(status);
    }

    let healthy = components.iter().all(|c| c.status == "healthy");
    if !healthy {
        warn!(target: "api.health", "健康检查存在异常组件");
    }

    let status = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: build_info::summary(),
        role: app_state.role.as_str().to_string(),
        timestamp: Utc::now().to_rfc3339(),
        components,
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let mut resp = (code, Json(status)).into_response();
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp
}

fn component(name: &str, result: anyhow::Result<bool>, started: Instant) -> ComponentStatus {
    let (status, details) = match result {
        Ok(true) => ("healthy", None),
        Ok(false) => ("unhealthy", None),
        Err(e) => ("unhealthy", Some(format!("{:#}", e))),
    };
    ComponentStatus {
        name: name.to_string(),
        status: status.to_string(),
        details,
        response_time_ms: Some(started.elapsed().as_millis() as u64),
    }
}
