//! HTTP mapping for registry errors.
//!
//! Internal details are logged; response bodies carry a user-safe message
//! as `{"error": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_triggers_scheduler::TriggerError;
use rootcause::prelude::Report;
use serde_json::json;

/// Error type returned by route handlers.
#[derive(Debug)]
pub struct ApiError(pub Report<TriggerError>);

impl From<Report<TriggerError>> for ApiError {
    fn from(report: Report<TriggerError>) -> Self {
        Self(report)
    }
}

impl ApiError {
    /// Returns the status code and user-safe message for this error.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self.0.current_context() {
            e @ TriggerError::AlreadyExists { .. } => (StatusCode::CONFLICT, e.to_string()),
            e @ TriggerError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
            e @ (TriggerError::InvalidSchedule { .. } | TriggerError::InvalidName { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            e @ TriggerError::NotManual { .. } => (StatusCode::CONFLICT, e.to_string()),
            TriggerError::StoreUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "trigger store unavailable".to_string(),
            ),
            TriggerError::EngineUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "scheduler is not running".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: TriggerError) -> StatusCode {
        ApiError(e.into()).status_and_message().0
    }

    #[test]
    fn errors_map_to_status_codes() {
        let name = || "ping".to_string();
        assert_eq!(
            status_of(TriggerError::AlreadyExists { name: name() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(TriggerError::NotFound { name: name() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(TriggerError::InvalidSchedule {
                reason: "zero".to_string()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(TriggerError::NotManual { name: name() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(TriggerError::EngineUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn store_details_are_not_exposed() {
        let err = ApiError(
            TriggerError::StoreUnavailable {
                reason: "password authentication failed for user admin".to_string(),
            }
            .into(),
        );
        let (status, message) = err.status_and_message();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!message.contains("password"));
    }
}
