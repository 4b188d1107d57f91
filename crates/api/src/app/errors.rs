//! Error type for handlers and the `{ success, data | error }` envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use ironbooks_auth::AuthzError;
use ironbooks_core::DomainError;
use ironbooks_infra::command_dispatcher::DispatchError;
use ironbooks_infra::event_store::EventStoreError;

pub type ApiResult = Result<Response, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Forbidden(String),

    #[error("organization not found")]
    OrgNotFound,

    #[error("{0}")]
    InvalidId(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Store(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::OrgNotFound | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidId(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Forbidden(_) => "forbidden",
            ApiError::OrgNotFound => "org_not_found",
            ApiError::InvalidId(_) => "invalid_id",
            ApiError::Validation(_) => "validation_error",
            ApiError::InvariantViolation(_) => "invariant_violation",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::Store(_) => "store_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(msg) = &self {
            tracing::error!(error = %msg, "request failed in storage");
        }
        json_error(self.status(), self.code(), self.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Concurrency(msg) => ApiError::Conflict(msg),
            DispatchError::Validation(msg) => ApiError::Validation(msg),
            DispatchError::InvariantViolation(msg) => ApiError::InvariantViolation(msg),
            DispatchError::InvalidId(msg) => ApiError::InvalidId(msg),
            DispatchError::Unauthorized => ApiError::Forbidden("unauthorized".to_string()),
            DispatchError::NotFound => ApiError::not_found("resource"),
            // Cross-tenant access reads as absent.
            DispatchError::TenantIsolation(_) => ApiError::not_found("resource"),
            DispatchError::Deserialize(msg) | DispatchError::Publish(msg) => ApiError::Store(msg),
            DispatchError::Store(e) => ApiError::Store(e.to_string()),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        DispatchError::from(err).into()
    }
}

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        DispatchError::from(err).into()
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn ok<T: Serialize>(data: T) -> ApiResult {
    Ok(envelope(StatusCode::OK, data))
}

pub fn created<T: Serialize>(data: T) -> ApiResult {
    Ok(envelope(StatusCode::CREATED, data))
}

fn envelope<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_status_and_code() {
        let cases = [
            (DispatchError::Concurrency("stale".into()), StatusCode::CONFLICT, "conflict"),
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST, "validation_error"),
            (
                DispatchError::InvariantViolation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "invariant_violation",
            ),
            (DispatchError::InvalidId("x".into()), StatusCode::BAD_REQUEST, "invalid_id"),
            (DispatchError::NotFound, StatusCode::NOT_FOUND, "not_found"),
            (DispatchError::Publish("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn domain_conflict_is_a_409() {
        let api = ApiError::from(DomainError::conflict("dup"));
        assert_eq!(api.status(), StatusCode::CONFLICT);
    }
}
