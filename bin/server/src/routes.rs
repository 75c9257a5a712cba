//! HTTP routes for the trigger control surface.

use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use event_triggers_scheduler::{RegisterTrigger, Trigger, TriggerRegistry};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    /// The trigger registry.
    pub registry: Arc<TriggerRegistry>,
}

impl AppState {
    /// Creates new application state.
    pub fn new(registry: Arc<TriggerRegistry>) -> Self {
        Self { registry }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/triggers", post(register_trigger).get(list_triggers))
        .route("/triggers/{name}", get(get_trigger).delete(remove_trigger))
        .route("/triggers/{name}/fire", post(fire_trigger))
        .route("/executions", get(list_executions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn register_trigger(
    State(state): State<AppState>,
    Json(request): Json<RegisterTrigger>,
) -> Result<(StatusCode, Json<Trigger>), ApiError> {
    let trigger = state.registry.register(request).await?;
    Ok((StatusCode::CREATED, Json(trigger)))
}

async fn list_triggers(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let triggers = state.registry.list().await?;
    Ok(Json(json!({ "triggers": triggers })))
}

async fn get_trigger(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Trigger>, ApiError> {
    Ok(Json(state.registry.get(&name).await?))
}

async fn remove_trigger(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.remove(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fire_trigger(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.registry.fire_manual(&name).await?;
    Ok(Json(json!({ "payload": record.payload, "execution": record })))
}

#[derive(Debug, Deserialize)]
struct ExecutionsQuery {
    trigger: Option<String>,
}

async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let executions = state.registry.executions(query.trigger.as_deref()).await?;
    Ok(Json(json!({ "executions": executions })))
}
