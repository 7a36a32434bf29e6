use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::models::*;
use crate::workflow::WorkflowError;

use super::AppState;

// ============================================================
// Error Handling
// ============================================================

/// Map a workflow error to an HTTP response. Recoverable caller errors keep
/// their full message (an invalid transition lists the legal next statuses,
/// a failed condition carries its reason); anomalies are logged server-side
/// and sanitized so registry internals never leak through the public
/// contract.
fn workflow_error(e: WorkflowError) -> (StatusCode, String) {
    match &e {
        WorkflowError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        WorkflowError::InvalidTransition { .. } | WorkflowError::EffectFailed { .. } => {
            (StatusCode::CONFLICT, e.to_string())
        }
        WorkflowError::ConditionNotMet { .. } => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        _ => {
            tracing::error!(error = %e, "workflow anomaly");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

/// Log an internal error and return a sanitized response to the client.
/// Known validation errors (bad parent, missing item) are safe to expose.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    let msg = e.to_string();

    if msg.contains("not found") {
        tracing::warn!("Validation error: {}", msg);
        return (StatusCode::BAD_REQUEST, msg);
    }

    tracing::error!("Internal error: {}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn default_actor() -> String {
    "api".to_string()
}

// ============================================================
// Request bodies
// ============================================================

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub target_status: String,
    #[serde(default = "default_actor")]
    pub actor: String,
    #[serde(default)]
    pub change_source: Option<ChangeSource>,
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    #[serde(default = "default_actor")]
    pub actor: String,
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Work items
// ============================================================

pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<CreateItemInput>,
) -> Result<(StatusCode, Json<WorkItem>), (StatusCode, String)> {
    state
        .db
        .create_item(input)
        .map(|item| (StatusCode::CREATED, Json(item)))
        .map_err(internal_error)
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Vec<WorkItem>>, (StatusCode, String)> {
    state.db.list_items(&query).map(Json).map_err(internal_error)
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<WorkItem>, (StatusCode, String)> {
    state
        .engine
        .get_item(&reference)
        .map(Json)
        .map_err(workflow_error)
}

pub async fn list_children(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Vec<WorkItem>>, (StatusCode, String)> {
    let item = state.engine.get_item(&reference).map_err(workflow_error)?;
    state
        .db
        .get_children(item.id)
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Workflow operations
// ============================================================

pub async fn execute_transition(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionOutcome>, (StatusCode, String)> {
    let change_source = request.change_source.unwrap_or(ChangeSource::Direct);
    state
        .engine
        .execute_transition(&reference, &request.target_status, &request.actor, change_source)
        .map(Json)
        .map_err(workflow_error)
}

pub async fn list_transitions(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    state
        .engine
        .list_legal_transitions(&reference)
        .map(Json)
        .map_err(workflow_error)
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ItemHistory>, (StatusCode, String)> {
    state
        .engine
        .history(&reference)
        .map(Json)
        .map_err(workflow_error)
}

pub async fn start_work(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<StartedWork>, (StatusCode, String)> {
    state
        .engine
        .start_work(&reference, &request.actor)
        .map(Json)
        .map_err(workflow_error)
}

pub async fn complete_work(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<CompletedWork>, (StatusCode, String)> {
    state
        .engine
        .complete_work(&reference, &request.actor)
        .map(Json)
        .map_err(workflow_error)
}
