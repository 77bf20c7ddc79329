// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! Axum routes over the healing service:
//!
//! | Method | Path                                  | Purpose                      |
//! |--------|---------------------------------------|------------------------------|
//! | GET    | `/health`                             | liveness                     |
//! | POST   | `/v1/errors`                          | submit an error report       |
//! | GET    | `/v1/stats`                           | healing statistics           |
//! | GET    | `/v1/history?limit=N`                 | recent healing results       |
//! | GET    | `/v1/catalog`                         | active catalog patterns      |
//! | GET    | `/v1/catalog/candidates`              | learned promotion candidates |
//! | POST   | `/v1/catalog/candidates/{id}/promote` | promote a candidate          |
//! | GET    | `/v1/events?healing_id=…`             | healing events (SSE)         |

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::orchestrator::{HealingOrchestrator, HealingService};
use crate::application::pattern_catalog::CatalogError;
use crate::domain::error_report::ErrorReport;
use crate::domain::healing::HealingId;
use crate::infrastructure::event_bus::{EventBus, EventBusError};

const DEFAULT_HISTORY_LIMIT: usize = 50;

pub struct AppState {
    pub service: Arc<dyn HealingService>,
    pub event_bus: Arc<EventBus>,
}

pub fn app(orchestrator: Arc<HealingOrchestrator>) -> Router {
    let event_bus = orchestrator.event_bus().clone();
    router(orchestrator, event_bus)
}

pub fn router(service: Arc<dyn HealingService>, event_bus: Arc<EventBus>) -> Router {
    let state = Arc::new(AppState { service, event_bus });

    Router::new()
        .route("/health", get(health))
        .route("/v1/errors", post(submit_error))
        .route("/v1/stats", get(get_stats))
        .route("/v1/history", get(get_history))
        .route("/v1/catalog", get(list_catalog))
        .route("/v1/catalog/candidates", get(list_candidates))
        .route("/v1/catalog/candidates/{id}/promote", post(promote_candidate))
        .route("/v1/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SubmitErrorRequest {
    #[serde(alias = "message")]
    pub raw_message: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub healing_id: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!({ "error": message.into() })))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn submit_error(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitErrorRequest>,
) -> impl IntoResponse {
    if payload.raw_message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "raw_message must not be empty").into_response();
    }
    let report = payload
        .context
        .into_iter()
        .fold(ErrorReport::new(payload.raw_message), |report, (key, value)| {
            report.with_context(key, value)
        });
    Json(state.service.submit_error(report).await).into_response()
}

async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.get_stats())
}

async fn get_history(State(state): State<Arc<AppState>>, Query(query): Query<HistoryQuery>) -> impl IntoResponse {
    Json(state.service.history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)))
}

async fn list_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.catalog_entries())
}

async fn list_candidates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.promotion_candidates())
}

async fn promote_candidate(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(id) = Uuid::parse_str(&id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid candidate ID").into_response();
    };
    match state.service.promote_candidate(id) {
        Ok(entry) => Json(entry).into_response(),
        Err(e @ CatalogError::UnknownCandidate(_)) => error_response(StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response(),
    }
}

async fn stream_events(State(state): State<Arc<AppState>>, Query(query): Query<EventsQuery>) -> impl IntoResponse {
    let filter = match query.healing_id.as_deref().map(Uuid::parse_str) {
        None => None,
        Some(Ok(id)) => Some(HealingId(id)),
        Some(Err(_)) => return error_response(StatusCode::BAD_REQUEST, "Invalid healing ID").into_response(),
    };
    Sse::new(event_stream(&state.event_bus, filter))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn event_stream(
    event_bus: &EventBus,
    filter: Option<HealingId>,
) -> impl Stream<Item = Result<Event, axum::Error>> + Send + 'static {
    stream::unfold(event_bus.subscribe(), move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if filter.is_some_and(|id| id != event.healing_id()) => continue,
                Ok(event) => {
                    let sse = Event::default().event(event.event_type()).json_data(&event);
                    return Some((sse, receiver));
                }
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::factory::build_orchestrator;
    use crate::domain::healer_config::HealerConfigManifest;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        app(Arc::new(build_orchestrator(&HealerConfigManifest::default()).unwrap()))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_error_returns_healing_result() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/errors")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "raw_message": "ModuleNotFoundError: No module named 'advanced_analytics'" }).to_string(),
            ))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["pattern_type"], "install_or_fix_module");
        assert_eq!(body["outcome"], "solved");
        assert_eq!(body["solution"]["confidence"], 0.7);
        assert_eq!(body["solution"]["generated_fix"]["operation"], "install_or_fix_module");
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/errors")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "message": "  " }).to_string()))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_and_unknown_candidate() {
        let app = test_app();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["attempts"], 0);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/v1/catalog/candidates/{}/promote", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
