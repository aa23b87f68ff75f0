//! HTTP error bodies: `{"ok": false, "error": "..."}`

use axum::{
    extract::multipart::MultipartError,
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use karaoke_core::{CoreError, ToolKind};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Tool stderr stays in the logs; clients get the failing step
        let message = match &err {
            CoreError::ToolFailed { tool, .. } | CoreError::ToolSpawn { tool, .. } | CoreError::ToolTimeout { tool, .. } => {
                tracing::error!(error = %err, "job step failed");
                match tool {
                    ToolKind::Downloader => "Failed to download media from URL".to_string(),
                    ToolKind::Separator => "Audio separation failed".to_string(),
                    ToolKind::Transcoder => "Audio transcoding failed".to_string(),
                }
            }
            CoreError::OutputNotFound { .. } | CoreError::AmbiguousOutput { .. } => {
                tracing::error!(error = %err, "job output missing");
                "No output found".to_string()
            }
            _ if status.is_server_error() => {
                tracing::error!(error = %err, "internal error");
                "Internal server error".to_string()
            }
            _ => err.to_string(),
        };

        Self { status, message }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid JSON body: {}", err.body_text()))
    }
}

impl From<FormRejection> for ApiError {
    fn from(err: FormRejection) -> Self {
        Self::bad_request(format!("Invalid form body: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"ok": false, "error": self.message});
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validation_maps_to_400_with_detail() {
        let err = ApiError::from(CoreError::InvalidSemitones("\"abc\" is not a number".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("abc"));
    }

    #[test]
    fn test_tool_failure_hides_stderr() {
        let err = ApiError::from(CoreError::ToolFailed {
            tool: ToolKind::Separator,
            code: Some(1),
            stderr: "Traceback (most recent call last)".into(),
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Audio separation failed");
    }

    #[test]
    fn test_missing_output_is_500() {
        let err = ApiError::from(CoreError::OutputNotFound { path: PathBuf::from("/w/output") });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "No output found");
    }
}
