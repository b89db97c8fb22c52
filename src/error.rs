// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types: the engine's [`MarketError`] and the HTTP-facing
//! [`AppError`] with consistent API responses.

use crate::db::StoreError;
use crate::services::outcome::MirrorFailure;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

// ─── Engine Errors ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BidError {
    #[error("the owner of a product cannot bid on it")]
    OwnerCannotBid,

    #[error("bidding on this product has closed")]
    PastCloseDate,

    #[error("bid of {amount} does not exceed current price {floor}")]
    AmountTooLow { amount: f64, floor: f64 },

    #[error("bid amount must be a positive number")]
    InvalidAmount,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProductError {
    #[error("close date is in the past")]
    CloseDateInPast,

    #[error("close date must be at least {min_days} days away")]
    CloseDateTooSoon { min_days: i64 },

    #[error("product has not closed yet")]
    NotClosedYet,

    #[error("buyer must be the highest bidder")]
    BuyerMismatch,

    #[error("price must be a non-negative number")]
    InvalidPrice,

    #[error("initial price cannot change once bids exist")]
    PriceLocked,

    #[error("product has closed and can no longer be edited")]
    ClosedForEdits,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RatingError {
    #[error("rating must be between 1 and 5")]
    ValueOutOfRange,

    #[error("product has no buyer or bidder to rate")]
    NoCounterpart,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("page and page_size must be at least 1")]
    InvalidPage,

    #[error("minimum {field} is greater than maximum")]
    InvertedRange { field: &'static str },
}

/// Which precondition a mutation failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationFailure {
    #[error(transparent)]
    Bid(#[from] BidError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Rating(#[from] RatingError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{0}")]
    Input(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConflictReason {
    #[error("this user already rated the product")]
    DuplicateRating,

    #[error("bid of {amount} was overtaken by a concurrent bid (current price {current_price})")]
    ConcurrentBid { amount: f64, current_price: f64 },

    #[error("username {0} is taken")]
    UsernameTaken(String),

    #[error("product already has a different buyer")]
    AlreadyResolved,
}

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("malformed identifier {0:?}")]
    InvalidReference(String),

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationFailure),

    #[error("not permitted: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(ConflictReason),

    #[error("{} mirror write(s) failed", .failures.len())]
    PartialWriteFailure {
        source_written: bool,
        failures: Vec<MirrorFailure>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        MarketError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn input(reason: impl Into<String>) -> Self {
        MarketError::ValidationFailed(ValidationFailure::Input(reason.into()))
    }
}

impl From<BidError> for MarketError {
    fn from(err: BidError) -> Self {
        MarketError::ValidationFailed(err.into())
    }
}

impl From<ProductError> for MarketError {
    fn from(err: ProductError) -> Self {
        MarketError::ValidationFailed(err.into())
    }
}

impl From<RatingError> for MarketError {
    fn from(err: RatingError) -> Self {
        MarketError::ValidationFailed(err.into())
    }
}

impl From<QueryError> for MarketError {
    fn from(err: QueryError) -> Self {
        MarketError::ValidationFailed(err.into())
    }
}

/// Result type alias for engine operations
pub type MarketResult<T> = std::result::Result<T, MarketError>;

// ─── HTTP Errors ─────────────────────────────────────────────

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::NotFound { .. } => AppError::NotFound(err.to_string()),
            MarketError::InvalidReference(_) | MarketError::ValidationFailed(_) => {
                AppError::BadRequest(err.to_string())
            }
            MarketError::Unauthorized(reason) => AppError::Forbidden(reason),
            MarketError::Conflict(reason) => AppError::Conflict(reason.to_string()),
            MarketError::PartialWriteFailure { .. } | MarketError::Store(_) => {
                AppError::Database(err.to_string())
            }
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err: AppError = MarketError::from(BidError::OwnerCannotBid).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: AppError = MarketError::InvalidReference("a b".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_engine_errors_map_to_status_codes() {
        let cases = [
            (MarketError::not_found("product", "p1"), StatusCode::NOT_FOUND),
            (
                MarketError::Unauthorized("not the owner".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                MarketError::Conflict(ConflictReason::DuplicateRating),
                StatusCode::CONFLICT,
            ),
            (
                MarketError::Store(StoreError::Unavailable("conn reset".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let app: AppError = err.into();
            assert_eq!(app.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_store_errors_do_not_leak_details() {
        let app: AppError =
            MarketError::Store(StoreError::Unavailable("grpc: secret host".to_string())).into();
        let body = axum::body::to_bytes(app.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret host"));
        assert!(text.contains("database_error"));
    }
}
