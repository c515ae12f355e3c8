use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Domain error taxonomy. Every variant maps to a stable `code` string that
/// appears verbatim in error response bodies.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Shift overlaps an existing shift")]
    OverlappingShift,

    #[error("Order already has a payment")]
    PaymentAlreadyExists,

    #[error("Refund failed: {0}")]
    RefundFailed(String),

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Database error")]
    Db(#[from] sea_orm::DbErr),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable taxonomy name carried in the `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "Unauthenticated",
            AppError::Forbidden => "Forbidden",
            AppError::NotFound => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::AlreadyExists(_) => "AlreadyExists",
            AppError::ValidationFailed(_) => "ValidationFailed",
            AppError::IllegalTransition { .. } => "IllegalTransition",
            AppError::OverlappingShift => "OverlappingShift",
            AppError::PaymentAlreadyExists => "PaymentAlreadyExists",
            AppError::RefundFailed(_) => "RefundFailed",
            AppError::ProviderUnavailable(_) => "ProviderUnavailable",
            AppError::InvalidWebhookSignature => "InvalidWebhookSignature",
            AppError::RateLimited => "RateLimited",
            AppError::Db(_) | AppError::Internal(_) => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_)
            | AppError::AlreadyExists(_)
            | AppError::PaymentAlreadyExists
            | AppError::RefundFailed(_) => StatusCode::CONFLICT,
            AppError::ValidationFailed(_)
            | AppError::IllegalTransition { .. }
            | AppError::InvalidWebhookSignature => StatusCode::BAD_REQUEST,
            AppError::OverlappingShift => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Db(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::IllegalTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }

    /// True when the underlying database error is a Postgres serialization
    /// failure (SQLSTATE 40001), retryable inside a serializable transaction.
    pub fn is_serialization_conflict(&self) -> bool {
        match self {
            AppError::Db(err) => db_err_is_serialization_conflict(err),
            _ => false,
        }
    }

    /// True when the underlying database error is a unique-constraint
    /// violation (SQLSTATE 23505).
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Db(err) => db_err_has_code(err, "23505"),
            _ => false,
        }
    }
}

pub fn db_err_is_serialization_conflict(err: &sea_orm::DbErr) -> bool {
    db_err_has_code(err, "40001")
}

fn db_err_has_code(err: &sea_orm::DbErr, code: &str) -> bool {
    use sea_orm::{DbErr, RuntimeErr};
    let sqlx_err = match err {
        DbErr::Query(RuntimeErr::SqlxError(e))
        | DbErr::Exec(RuntimeErr::SqlxError(e))
        | DbErr::Conn(RuntimeErr::SqlxError(e)) => e,
        _ => return false,
    };
    sqlx_err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|c| c == code)
        .unwrap_or(false)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal failures are logged with their real cause and surfaced
        // with an opaque message.
        let message = match &self {
            AppError::Db(err) => {
                tracing::error!(error = %err, "database error");
                "Internal server error".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "unexpected error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            code: self.code().to_string(),
            message,
            details: self.details(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_codes_are_stable() {
        assert_eq!(AppError::Unauthenticated.code(), "Unauthenticated");
        assert_eq!(AppError::OverlappingShift.code(), "OverlappingShift");
        assert_eq!(
            AppError::PaymentAlreadyExists.code(),
            "PaymentAlreadyExists"
        );
        assert_eq!(
            AppError::IllegalTransition {
                from: "Completed".into(),
                to: "Pending".into()
            }
            .code(),
            "IllegalTransition"
        );
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::OverlappingShift.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Conflict("busy".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::ValidationFailed("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn illegal_transition_carries_details() {
        let err = AppError::IllegalTransition {
            from: "Pending".into(),
            to: "Completed".into(),
        };
        let details = err.details().expect("details");
        assert_eq!(details["from"], "Pending");
        assert_eq!(details["to"], "Completed");
    }
}
