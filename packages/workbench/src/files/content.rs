use axum::{
    Json,
    extract::{Query, State},
};

use super::types::{ContentResponse, FilePathQuery, SaveRequest, SaveResponse};
use crate::AppState;
use crate::error::ApiError;

/// Get the content of a text file within the workspace
pub async fn get_file_content(
    State(state): State<AppState>,
    Query(query): Query<FilePathQuery>,
) -> Result<Json<ContentResponse>, ApiError> {
    let content = super::load_file(&state.store, query.path).await?;
    Ok(Json(ContentResponse { content }))
}

/// Create or overwrite a file. Same rules as a `file:change` on the socket;
/// clients learn about the change from the watcher broadcast.
pub async fn save_file_content(
    State(state): State<AppState>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    let result = super::save_file(&state.store, req.path.clone(), req.content).await;
    state.metrics.file_written(result.is_ok());
    result?;
    Ok(Json(SaveResponse { saved: req.path }))
}
