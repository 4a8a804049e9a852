use axum::{Json, extract::State};

use super::types::TreeResponse;
use crate::AppState;
use crate::error::ApiError;

/// Current tree of the whole workspace, rebuilt on every call
pub async fn get_file_tree(State(state): State<AppState>) -> Result<Json<TreeResponse>, ApiError> {
    let tree = super::snapshot_tree(&state.store).await?;
    Ok(Json(TreeResponse { tree }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
    use serde_json::json;
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/files", get(get_file_tree))
            .with_state(state)
    }

    async fn fetch(app: Router) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri("/files").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_tree_mirrors_workspace() {
        let (state, _tmp) = crate::test_helpers::test_app_state();
        let (status, json) = fetch(app(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({ "tree": { "a.txt": null, "src": { "main.js": null } } })
        );
    }

    #[tokio::test]
    async fn test_tree_is_recomputed() {
        let (state, tmp) = crate::test_helpers::test_app_state();
        let app = app(state);
        std::fs::create_dir(tmp.path().join("docs")).unwrap();
        std::fs::remove_file(tmp.path().join("a.txt")).unwrap();

        let (_, json) = fetch(app).await;
        assert_eq!(
            json["tree"],
            json!({ "docs": {}, "src": { "main.js": null } })
        );
    }

    #[tokio::test]
    async fn test_unreadable_root_is_server_error() {
        let (state, tmp) = crate::test_helpers::test_app_state();
        let app = app(state);
        std::fs::remove_dir_all(tmp.path()).unwrap();

        let (status, json) = fetch(app).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "io_error");
    }
}
