//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::AgentError;
use crate::models::app::CloudApplication;
use crate::server::state::ServerState;
use crate::sync::prompt::{FixedPrompter, Prefer};
use crate::utils::version_info;
use crate::workspace::actions::WorkspaceAction;

/// Error body returned by every failing handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `AgentError` as an HTTP response
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgentError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::UserDeclined(_) | AgentError::PartialStateMismatch(_) => {
                StatusCode::CONFLICT
            }
            AgentError::NetworkFailure(_) | AgentError::RejectedByServer { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!("Request failed: {}", self.0);
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "camsync".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Device identity handler
pub async fn device_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.system.get_device_info().await?))
}

/// Workspace status handler
pub async fn workspace_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.workspace.status().await)
}

/// Applications response
#[derive(Debug, Serialize)]
pub struct AppsResponse {
    pub apps: Vec<CloudApplication>,
    pub active_app_id: Option<String>,
    pub total: usize,
}

/// Application list handler
pub async fn apps_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let apps = state.workspace.list().await?;
    let active_app_id = state.workspace.binding().await.app_id().map(str::to_string);
    let total = apps.len();
    Ok(Json(AppsResponse {
        apps,
        active_app_id,
        total,
    }))
}

/// Sync request; without `prefer` a mismatch is reported, not settled
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
    pub prefer: Option<Prefer>,
}

/// Sync handler
pub async fn sync_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SyncRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prompter = FixedPrompter::new(request.prefer, false);
    Ok(Json(state.workspace.sync(&prompter).await?))
}

/// Save handler
pub async fn save_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.workspace.save().await?))
}

/// Load handler
pub async fn load_handler(
    State(state): State<Arc<ServerState>>,
    Path(app_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.workspace.load(&app_id).await?))
}

/// Action request: the action plus the answers to give along the way
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    #[serde(flatten)]
    pub action: WorkspaceAction,

    #[serde(default)]
    pub prefer: Option<Prefer>,

    /// Answer to "save the current application first?"
    #[serde(default)]
    pub save_current: bool,
}

/// Workspace action handler
pub async fn action_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ActionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prompter = FixedPrompter::new(request.prefer, request.save_current);
    Ok(Json(
        state
            .workspace
            .apply_action(request.action, &prompter)
            .await?,
    ))
}
