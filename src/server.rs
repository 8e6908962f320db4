use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::{info, warn};

use crate::dispatch::{AnalysisDispatcher, AnalyzeRequest};
use crate::ingest::{SyncReport, SyncScheduler, WebhookAck, WebhookProcessor};
use crate::store::CallStore;

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CallStore>,
    pub dispatcher: Arc<AnalysisDispatcher>,
    pub webhooks: Arc<WebhookProcessor>,
    pub scheduler: Arc<SyncScheduler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/openphone/calls", post(webhook_handler))
        .route("/webhooks/openphone/health", get(webhook_health))
        .route("/sync", post(sync_handler))
        .route("/calls/{id}/analyze", post(analyze_handler))
        .with_state(state)
}

/// Always 200; the body is read raw so malformed JSON is still acknowledged
async fn webhook_handler(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    Json(state.webhooks.clone().handle(&body).await)
}

async fn webhook_health(State(state): State<AppState>) -> Response {
    match state.store.latest_heartbeat().await {
        Ok(last) => Json(json!({
            "status": "ok",
            "lastEvent": last,
        }))
        .into_response(),
        Err(e) => {
            warn!("heartbeat lookup failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "error", "error": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn sync_handler(State(state): State<AppState>) -> Json<Vec<SyncReport>> {
    info!("on-demand sync requested");
    Json(state.scheduler.run_all().await)
}

async fn analyze_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let outcome = state.dispatcher.analyze(AnalyzeRequest::new(id)).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(outcome)).into_response()
}
