use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::common::{ALREADY_PROCESSED, IGNORED, OK, WebhookResult, extract_signature, internal, parse, verify_any};
use crate::db::AppState;
use crate::payments::StripeThinEvent;
use crate::reconcile::{AccountOutcome, EventKey, apply_thin_account_event};

/// Thin events only name the object that changed. The account is fetched
/// from the provider before anything is stored.
pub async fn handle_stripe_thin_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    process(&state, &headers, &body).await.unwrap_or_else(|e| e)
}

async fn process(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<WebhookResult, WebhookResult> {
    let signature = extract_signature(headers)?;
    let secrets: Vec<String> = state.webhook_secrets.thin.iter().cloned().collect();
    verify_any(&secrets, body, signature)?;

    let event: StripeThinEvent = parse(body)?;
    if !event.event_type.starts_with("v2.core.account") {
        return Ok(IGNORED);
    }
    let Some(account_id) = event
        .related_object
        .as_ref()
        .filter(|o| o.object_type == "v2.core.account")
        .map(|o| o.id.as_str())
    else {
        return Ok((StatusCode::OK, "No related account"));
    };

    let Some(gateway) = state.payments.clone() else {
        tracing::error!(event_id = %event.id, "Thin event received but payments are not configured");
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Payments not configured"));
    };

    let key = EventKey::thin(&event.id, &event.event_type);
    let outcome = apply_thin_account_event(&state.db, gateway.as_ref(), key, account_id)
        .await
        .map_err(internal)?;

    Ok(match outcome {
        AccountOutcome::Synced(_) => OK,
        AccountOutcome::Duplicate => ALREADY_PROCESSED,
        AccountOutcome::Unknown => {
            tracing::warn!(account_id, event_type = %event.event_type, "Thin event for unknown account");
            (StatusCode::OK, "Account not found")
        }
    })
}
