//! Error taxonomy shared by the services and the HTTP layer.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{CartError, OrderError, ProductError, VoucherRejection};
use crate::domain::value_objects::VoucherCodeError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock for {name}: {requested} requested")]
    InsufficientStock { product_id: Uuid, variant_id: Option<Uuid>, name: String, requested: u32 },

    #[error("Voucher rejected: {0}")]
    VoucherRejected(VoucherRejection),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Service unavailable: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::UnknownOrder(_) => StatusCode::NOT_FOUND,
            Self::VoucherRejected(VoucherRejection::NotFound) => StatusCode::NOT_FOUND,
            Self::VoucherRejected(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::InsufficientStock { .. } => StatusCode::CONFLICT,
            Self::Database(_) | Self::Transient(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only infrastructure failures are worth retrying; business failures
    /// will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Transient(_))
    }

    fn response_message(&self) -> String {
        match self {
            Self::Database(_) => "Database error".to_string(),
            Self::Transient(_) => "Storage temporarily unavailable".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientStock { product_id, variant_id, name, requested } => Some(json!({
                "product_id": product_id, "variant_id": variant_id, "name": name, "requested": requested,
            })),
            Self::VoucherRejected(reason) => Some(json!({ "reason": reason })),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            retryable: self.is_retryable(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

/// Pool exhaustion and dropped connections surface as `Transient`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => Self::Transient(err.to_string()),
            other => Self::Database(other),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self { Self::Validation(err.to_string()) }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self { Self::Validation(rejection.body_text()) }
}

impl From<VoucherCodeError> for AppError {
    fn from(err: VoucherCodeError) -> Self { Self::Validation(err.to_string()) }
}

impl From<VoucherRejection> for AppError {
    fn from(reason: VoucherRejection) -> Self { Self::VoucherRejected(reason) }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::LineNotFound => Self::NotFound(err.to_string()),
            CartError::InvalidQuantity => Self::Validation(err.to_string()),
        }
    }
}

impl From<ProductError> for AppError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::Inactive => Self::Conflict(err.to_string()),
            ProductError::UnknownVariant(_) => Self::NotFound(err.to_string()),
            ProductError::VariantRequired | ProductError::NoVariants => Self::Validation(err.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self { Self::Conflict(err.to_string()) }
}
