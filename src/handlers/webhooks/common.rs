//! Shared webhook plumbing: signature checks and error mapping.

use axum::http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::payments::verify_webhook_signature;

/// Result type for webhook operations.
///
/// 200 tells the provider to stop retrying, so it is also used for events we
/// can never act on (unknown seller or order). Transient failures return 500.
pub type WebhookResult = (StatusCode, &'static str);

pub(super) const OK: WebhookResult = (StatusCode::OK, "OK");
pub(super) const ALREADY_PROCESSED: WebhookResult = (StatusCode::OK, "Already processed");
pub(super) const IGNORED: WebhookResult = (StatusCode::OK, "Event ignored");

pub(super) fn extract_signature(headers: &HeaderMap) -> Result<&str, WebhookResult> {
    headers
        .get("stripe-signature")
        .ok_or((StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
        .to_str()
        .map_err(|e| {
            tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid signature header")
        })
}

/// Accept the payload if it is signed by any of `secrets`.
pub(super) fn verify_any(secrets: &[String], body: &[u8], signature: &str) -> Result<(), WebhookResult> {
    if secrets.is_empty() {
        tracing::error!("Webhook received but no signing secret is configured");
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Webhook secret not configured"));
    }

    for secret in secrets {
        match verify_webhook_signature(body, signature, secret) {
            Ok(true) => return Ok(()),
            Ok(false) => continue,
            Err(e) => {
                tracing::debug!("Malformed Stripe signature header: {}", e);
                return Err((StatusCode::BAD_REQUEST, "Invalid signature header"));
            }
        }
    }
    Err((StatusCode::UNAUTHORIZED, "Invalid signature"))
}

pub(super) fn parse<T: DeserializeOwned>(value: &[u8]) -> Result<T, WebhookResult> {
    serde_json::from_slice(value).map_err(|e| {
        tracing::warn!("Unparseable webhook payload: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid payload")
    })
}

/// Deserialize the `data.object` of a snapshot event.
pub(super) fn parse_object<T: DeserializeOwned>(object: serde_json::Value) -> Result<T, WebhookResult> {
    serde_json::from_value(object).map_err(|e| {
        tracing::warn!("Unexpected webhook object shape: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid event object")
    })
}

/// Map a processing error to a retryable response.
pub(super) fn internal(e: AppError) -> WebhookResult {
    match e {
        AppError::Upstream(_) => {
            tracing::error!("Provider call failed while processing webhook: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Provider error")
        }
        _ => {
            tracing::error!("Webhook processing failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}
