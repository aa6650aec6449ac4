use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid filter value: {0}")]
    InvalidFilterValue(String),
    #[error("Search keyword must not be empty")]
    EmptySearchKeyword,
    #[error("Not Found: {message}")]
    NotFound { code: &'static str, message: String },
    #[error("Unknown reference: {message}")]
    UnknownReference { code: &'static str, message: String },
    #[error("Conflict: {message}")]
    Conflict { code: &'static str, message: String },
    #[error("Tag is used by {todo_count} todo(s)")]
    TagInUse { todo_count: u64 },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_)
            | AppError::InvalidFilterValue(_)
            | AppError::EmptySearchKeyword
            | AppError::UnknownReference { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } | AppError::TagInUse { .. } => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code sent as `errorCode`.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "VALIDATION_FAILED",
            AppError::InvalidFilterValue(_) => "INVALID_FILTER_VALUE",
            AppError::EmptySearchKeyword => "EMPTY_SEARCH_KEYWORD",
            AppError::NotFound { code, .. }
            | AppError::UnknownReference { code, .. }
            | AppError::Conflict { code, .. } => *code,
            AppError::TagInUse { .. } => "TAG_IN_USE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let body = match &self {
            AppError::InvalidInput(msg) | AppError::InvalidFilterValue(msg) => json!({ "error": msg, "errorCode": code }),
            AppError::NotFound { message, .. }
            | AppError::UnknownReference { message, .. }
            | AppError::Conflict { message, .. } => json!({ "error": message, "errorCode": code }),
            AppError::EmptySearchKeyword => {
                json!({ "error": "Please enter a search keyword.", "errorCode": code })
            }
            AppError::TagInUse { todo_count } => json!({
                "error": format!("{todo_count} todo(s) still use this tag, so it cannot be deleted."),
                "errorCode": code,
                "todoCount": todo_count,
            }),
            AppError::DatabaseError(msg) => {
                error!(error = %msg, "Request failed on a storage error.");
                json!({ "error": "Internal database error.", "errorCode": code })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_mapping() {
        let cases = [
            (AppError::InvalidInput("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            (AppError::EmptySearchKeyword, StatusCode::BAD_REQUEST, "EMPTY_SEARCH_KEYWORD"),
            (
                AppError::NotFound { code: "TODO_NOT_FOUND", message: "gone".into() },
                StatusCode::NOT_FOUND,
                "TODO_NOT_FOUND",
            ),
            (AppError::TagInUse { todo_count: 2 }, StatusCode::CONFLICT, "TAG_IN_USE"),
            (
                AppError::DatabaseError("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[tokio::test]
    async fn test_database_error_body_hides_details() {
        let err = AppError::DatabaseError("no such table: secret_todo".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errorCode"], "DATABASE_ERROR");
        assert_eq!(body["error"], "Internal database error.");
        assert!(!String::from_utf8_lossy(&bytes).contains("secret_todo"));
    }
}
