//! HTTP error type.
//!
//! Every failure leaves the API as `{"detail": ...}`, where `detail` is a
//! message or, for a rejected workflow graph, the list of graph defects.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use db::DbError;
use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// The workflow graph cannot be executed.
    #[error("workflow graph is invalid: {}", .0.join(" "))]
    InvalidGraph(Vec<String>),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidGraph(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(self) -> Value {
        match self {
            Self::BadRequest(message) | Self::NotFound(message) => Value::String(message),
            Self::InvalidGraph(errors) => json!(errors),
            Self::Internal(_) => Value::String("Internal server error".into()),
        }
    }
}

/// Map [`DbError::NotFound`] to a 404 carrying `message`; anything else
/// converts as usual.
pub(crate) fn or_not_found(message: &'static str) -> impl Fn(DbError) -> ApiError {
    move |err| match err {
        DbError::NotFound => ApiError::not_found(message),
        other => other.into(),
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Self::not_found("Not found"),
            DbError::InvalidReference(message) => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::WorkflowNotFound(_) => Self::not_found("Workflow not found"),
            EngineError::RunNotFound(_) => Self::not_found("Run not found"),
            EngineError::Database(db) => db.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(message) = &self {
            error!(%message, "request failed");
        }
        let status = self.status();
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidGraph(vec![]).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn graph_defects_are_listed_in_detail() {
        let detail = ApiError::InvalidGraph(vec!["a".into(), "b".into()]).detail();
        assert_eq!(detail, json!(["a", "b"]));
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let detail = ApiError::Internal("connection refused".into()).detail();
        assert_eq!(detail, json!("Internal server error"));
    }

    #[test]
    fn db_errors_map_to_http() {
        let err: ApiError = DbError::InvalidReference("bad id".into()).into();
        assert!(matches!(err, ApiError::BadRequest(m) if m == "bad id"));

        let err = or_not_found("Step not found")(DbError::NotFound);
        assert!(matches!(err, ApiError::NotFound(m) if m == "Step not found"));
    }

    #[test]
    fn engine_errors_map_to_http() {
        let err: ApiError = EngineError::WorkflowNotFound(uuid::Uuid::nil()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = EngineError::NoStartStep.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
