use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// JSON body returned for every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Domain and infrastructure errors raised by the service layer.
///
/// Every error carries a stable kind and a human-readable message; nothing is
/// retried inside the domain logic — retries belong to the storage and network
/// collaborators, not here.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Coupon not valid: {0}")]
    CouponNotValid(String),

    #[error("Below minimum purchase: {0}")]
    BelowMinimumPurchase(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::VariantNotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock(_)
            | Self::CouponNotValid(_)
            | Self::BelowMinimumPurchase(_)
            | Self::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DuplicateKey(_) => StatusCode::CONFLICT,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the message exposed in HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::VariantNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::CouponNotValid("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::BelowMinimumPurchase("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::DuplicateKey("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("connection pool exhausted".into()).response_message(),
            "Internal server error"
        );

        // User-facing errors keep the actual message
        assert_eq!(
            ServiceError::NotFound("Product missing".into()).response_message(),
            "Not found: Product missing"
        );
        assert_eq!(
            ServiceError::InsufficientStock("Widget short by 2".into()).response_message(),
            "Insufficient stock: Widget short by 2"
        );
    }
}
