mod handlers;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::db::Database;
use crate::workflow::{WorkflowEngine, WorkflowError};

pub use middleware::SecurityConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: WorkflowEngine,
}

/// Build the HTTP surface with no authentication (local development and
/// tests).
pub fn create_router(db: Database) -> Result<Router, WorkflowError> {
    create_router_with_config(db, SecurityConfig::disabled())
}

/// Build the HTTP surface. Fails if the transition registry references an
/// unregistered condition or side effect, so a misconfigured server refuses
/// to start instead of failing on the first request.
pub fn create_router_with_config(
    db: Database,
    security: SecurityConfig,
) -> Result<Router, WorkflowError> {
    let engine = WorkflowEngine::new(db.clone())?;
    let state = AppState { db, engine };

    let api = Router::new()
        // Work items (creation and reads; status changes go through the engine)
        .route("/items", post(handlers::create_item))
        .route("/items", get(handlers::list_items))
        .route("/items/{reference}", get(handlers::get_item))
        .route("/items/{reference}/children", get(handlers::list_children))
        // Workflow operations
        .route("/items/{reference}/transition", post(handlers::execute_transition))
        .route("/items/{reference}/transitions", get(handlers::list_transitions))
        .route("/items/{reference}/history", get(handlers::get_history))
        .route("/items/{reference}/start", post(handlers::start_work))
        .route("/items/{reference}/complete", post(handlers::complete_work))
        // Health
        .route("/health", get(handlers::health));

    Ok(Router::new()
        .nest("/api/v1", api)
        .layer(axum::middleware::from_fn_with_state(
            security.clone(),
            middleware::require_api_key,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer(&security))
        .with_state(state))
}
