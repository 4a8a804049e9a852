use serde::{Deserialize, Serialize};
use workspace_fs::FileTree;

#[derive(Deserialize)]
pub struct FilePathQuery {
    pub path: String,
}

#[derive(Serialize)]
pub struct TreeResponse {
    pub tree: FileTree,
}

#[derive(Serialize)]
pub struct ContentResponse {
    pub content: String,
}

#[derive(Deserialize)]
pub struct SaveRequest {
    pub path: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct SaveResponse {
    pub saved: String,
}
