use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::task::JoinError;
use workspace_fs::WorkspaceError;

// =============================================================================
// API Errors
// =============================================================================

/// Failure of a Workspace API request, rendered as `{"error", "message"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("filesystem task failed: {0}")]
    Join(#[from] JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Workspace(e) => match e {
                WorkspaceError::NotFound(_) => StatusCode::NOT_FOUND,
                WorkspaceError::PathEscape(_) => StatusCode::FORBIDDEN,
                WorkspaceError::IsDirectory(_) | WorkspaceError::NotText(_) => {
                    StatusCode::BAD_REQUEST
                }
                WorkspaceError::Io { .. } | WorkspaceError::Watch { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Workspace(e) => e.error_code(),
            ApiError::Join(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        (
            status,
            Json(serde_json::json!({
                "error": self.error_code(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (WorkspaceError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (WorkspaceError::PathEscape("..".into()), StatusCode::FORBIDDEN),
            (WorkspaceError::IsDirectory("src".into()), StatusCode::BAD_REQUEST),
            (WorkspaceError::NotText("b".into()), StatusCode::BAD_REQUEST),
            (
                WorkspaceError::Io {
                    path: "c".into(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_response_body() {
        let response = ApiError::from(WorkspaceError::NotFound("/missing.txt".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["message"], "not found: /missing.txt");
    }
}
