use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::environment::HostEnvironment;
use super::error::WebError;
use super::exception::render_unhandled_errors;
use super::retry::retry_default_page;
use crate::events::GroupCreated;
use crate::producer::MessageService;

/// Shared state for the HTTP host.
#[derive(Clone)]
pub struct AppState {
    pub messages: Arc<dyn MessageService>,
    /// Directory holding the built SPA (`index.html` and assets).
    pub spa_root: PathBuf,
    pub environment: HostEnvironment,
}

impl AppState {
    pub fn new(
        messages: Arc<dyn MessageService>,
        spa_root: impl Into<PathBuf>,
        environment: HostEnvironment,
    ) -> Self {
        Self {
            messages,
            spa_root: spa_root.into(),
            environment,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

/// Build the HTTP host.
///
/// Pipeline, outermost first: unhandled-error renderer, default page retry,
/// then routing. Unknown paths fall through to the SPA shell.
pub fn router(state: AppState) -> Router {
    let environment = state.environment;
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/groups", post(create_group_handler))
        .fallback(spa_fallback)
        .layer(middleware::from_fn(retry_default_page))
        .layer(middleware::from_fn_with_state(
            environment,
            render_unhandled_errors,
        ))
        .with_state(state)
}

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "environment": state.environment.to_string() }))
}

/// `POST /api/groups`: publish a `GroupCreated` event for the ingest worker.
async fn create_group_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<StatusCode, WebError> {
    if request.name.trim().is_empty() {
        return Err(WebError::BadRequest("group name must not be empty".into()));
    }
    let event = GroupCreated::new(request.name, request.is_active);
    state.messages.send(&event).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Serve the SPA shell for any path not matched above.
async fn spa_fallback(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    let index = state.spa_root.join("index.html");
    match tokio::fs::read_to_string(&index).await {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            debug!(path = %index.display(), error = %e, "Default page unavailable");
            Err(WebError::DefaultPageNotReady {
                path: index.display().to_string(),
            })
        }
    }
}
