pub mod content;
pub mod tree;
pub mod types;

use std::sync::Arc;
use workspace_fs::{FileTree, WorkspaceStore};

use crate::error::ApiError;

// Re-export handlers for route registration
pub use content::{get_file_content, save_file_content};
pub use tree::get_file_tree;

// Store calls block on disk I/O, so they run on the blocking pool. The
// WebSocket gateway goes through the same helpers as the HTTP handlers.

pub(crate) async fn snapshot_tree(store: &Arc<WorkspaceStore>) -> Result<FileTree, ApiError> {
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || store.list_tree()).await??)
}

pub(crate) async fn load_file(store: &Arc<WorkspaceStore>, path: String) -> Result<String, ApiError> {
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || store.read_file(&path)).await??)
}

pub(crate) async fn save_file(
    store: &Arc<WorkspaceStore>,
    path: String,
    content: String,
) -> Result<(), ApiError> {
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || store.write_file(&path, content)).await??)
}
