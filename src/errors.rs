use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

use crate::entities::payment_transaction::TransactionStatus;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Stable machine-readable code (e.g., "coupon_rejected:expired")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Closed set of reasons a coupon can be refused at validation time.
///
/// The order of the checks that produce these is fixed (existence, active
/// flag, time window, quota, plan match); callers can rely on the first
/// failing check winning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    QuotaExhausted,
    WrongSystemStep,
    PlanMismatch,
}

impl CouponRejection {
    /// Stable code embedded in error responses.
    pub fn code(&self) -> String {
        format!("coupon_rejected:{}", self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Coupon rejected: {0}")]
    CouponRejected(CouponRejection),

    #[error("Pricing invariant violated: {0}")]
    PricingInvariant(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Convenience constructor for wrapping string-based database errors.
    pub fn database_error_message(message: impl Into<String>) -> Self {
        ServiceError::DatabaseError(DbErr::Custom(message.into()))
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) | Self::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::CouponRejected(_) | Self::PricingInvariant(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InternalError(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the stable machine-readable code for this error, when one
    /// is defined. Clients branch on these, never on the message text.
    pub fn error_code(&self) -> Option<String> {
        match self {
            Self::CouponRejected(rejection) => Some(rejection.code()),
            Self::PricingInvariant(_) => Some("pricing_invariant".to_string()),
            Self::InvalidTransition { .. } => Some("invalid_transition".to_string()),
            Self::Unauthorized(_) => Some("unauthorized".to_string()),
            _ => None,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.error_code(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coupon_rejection_codes_are_stable() {
        assert_eq!(CouponRejection::Expired.code(), "coupon_rejected:expired");
        assert_eq!(
            CouponRejection::QuotaExhausted.code(),
            "coupon_rejected:quota_exhausted"
        );
        assert_eq!(
            CouponRejection::WrongSystemStep.code(),
            "coupon_rejected:wrong_system_step"
        );
    }

    #[test]
    fn status_codes_distinguish_client_from_operator_errors() {
        assert_eq!(
            ServiceError::CouponRejected(CouponRejection::Expired).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                from: TransactionStatus::Fulfilled,
                to: TransactionStatus::Paid,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::NotFound("plan".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
