use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// User-facing error messages shared between handlers and tests.
pub mod msg {
    pub const INVALID_API_KEY: &str = "Invalid API key";
    pub const PAYMENTS_NOT_CONFIGURED: &str = "Payments not configured";
    pub const SUBSCRIPTION_REQUIRED: &str = "An active ReplaySell subscription is required";
    pub const SUBSCRIPTION_ALREADY_ACTIVE: &str = "Subscription is already active";
    pub const NO_BILLING_CUSTOMER: &str = "No billing customer for this seller";
    pub const NO_CONNECTED_ACCOUNT: &str = "No connected account for this seller";
    pub const SELLER_CANNOT_ACCEPT_PAYMENTS: &str = "Seller cannot accept payments yet";
    pub const PLATFORM_PRICE_NOT_CONFIGURED: &str = "Platform price not configured";
    pub const CONNECT_PRICE_NOT_CONFIGURED: &str = "Connected account price not configured";

    pub const REPLAY_NOT_FOUND: &str = "Replay not found";
    pub const REPLAY_EXPIRED: &str = "Replay has expired";
    pub const REPLAY_ARCHIVED: &str = "Replay is archived";
    pub const REPLAY_NOT_LIVE: &str = "Replay is not live";
    pub const ALERTS_ALREADY_SENT: &str = "Alerts were already sent for this replay";
    pub const TITLE_EMPTY: &str = "Title cannot be empty";
    pub const INVALID_EXPIRY_HOURS: &str = "expires_in_hours must be between 1 and 720";

    pub const PRODUCT_NOT_FOUND: &str = "Product not found";
    pub const NAME_EMPTY: &str = "Name cannot be empty";
    pub const INVALID_PRICE: &str = "price_cents must be between 1 and 99999999";
    pub const ORDER_TOTAL_TOO_LARGE: &str = "Order total is too large";
    pub const INVALID_STOCK: &str = "stock cannot be negative";
    pub const INVALID_CURRENCY: &str = "currency must be a 3-letter ISO code";
    pub const INVALID_QUANTITY: &str = "quantity must be between 1 and 10";
    pub const OUT_OF_STOCK: &str = "Out of stock";
    pub const PRODUCT_HAS_PENDING_ORDERS: &str = "Product has pending orders";

    pub const ORDER_NOT_FOUND: &str = "Order not found";
    pub const INVALID_EMAIL: &str = "Invalid email address";
    pub const SUBSCRIBER_NOT_FOUND: &str = "Subscription not found";

    pub const INVALID_URL: &str = "Video URL must be a public https link";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::PaymentRequired(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "Payment required", Some(msg.clone()))
            }
            AppError::Gone(msg) => (StatusCode::GONE, "Gone", Some(msg.clone())),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string())),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
