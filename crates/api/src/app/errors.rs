use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use kinship_core::DomainError;
use kinship_family::FamilyError;
use kinship_infra::RepositoryError;

/// Every failure the API can report. Each maps to a status code plus a
/// stable `kind`; backend causes are logged, never returned to the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Family(#[from] FamilyError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The request body could not be read as the expected JSON.
    #[error(transparent)]
    InvalidRequest(#[from] JsonRejection),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Family(e) => e.kind(),
            AppError::Domain(e) => e.kind(),
            AppError::Repository(e) => e.kind(),
            AppError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Family(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            AppError::Family(FamilyError::Invalid(_)) => StatusCode::BAD_REQUEST,
            AppError::Family(
                FamilyError::TooManyParents { .. }
                | FamilyError::ParentExists { .. }
                | FamilyError::ChildExists { .. }
                | FamilyError::AlreadyDeceased { .. },
            ) => StatusCode::CONFLICT,
            AppError::Family(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Domain(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(rejection) => rejection.status(),
            AppError::Repository(e) => match e {
                RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
                RepositoryError::ValidationFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RepositoryError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                RepositoryError::CircuitOpen { .. }
                | RepositoryError::Saturated { .. }
                | RepositoryError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                RepositoryError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                RepositoryError::BackendFailure { .. } => StatusCode::BAD_GATEWAY,
            },
        }
    }

    /// Client-facing message.
    pub fn message(&self) -> String {
        match self {
            AppError::Repository(RepositoryError::BackendFailure { attempts, .. }) => {
                format!("family storage failed after {attempts} attempt(s)")
            }
            AppError::Repository(RepositoryError::ValidationFailure(_)) => {
                "stored family record is invalid".to_string()
            }
            AppError::Repository(RepositoryError::CircuitOpen { .. }) => {
                "family storage is temporarily unavailable".to_string()
            }
            AppError::Repository(RepositoryError::Saturated { .. }) => {
                "family storage is busy".to_string()
            }
            AppError::Repository(RepositoryError::TimedOut { .. }) => {
                "family storage did not respond in time".to_string()
            }
            AppError::Repository(RepositoryError::RateLimitExceeded { .. }) => {
                "too many requests; retry later".to_string()
            }
            AppError::Repository(RepositoryError::Cancelled) => {
                "request was cancelled".to_string()
            }
            AppError::InvalidRequest(rejection) => rejection.body_text(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }
        json_error(status, self.kind(), self.message())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
