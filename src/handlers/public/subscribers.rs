use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use super::storefront::visible_replay;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::SubscribeRequest;
use crate::util::is_valid_email;

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub subscribed: bool,
}

/// Subscribe to a seller's "now live" alerts from one of their storefronts.
/// Subscribing again reactivates an unsubscribed address.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(input): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscribeResponse>)> {
    if !is_valid_email(&input.email) {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL.into()));
    }

    let conn = state.db.get()?;
    let replay = visible_replay(&conn, &slug)?;
    let subscriber = queries::upsert_subscriber(&conn, &replay.seller_id, &input.email, Some(&replay.id))?;
    tracing::debug!(seller_id = %replay.seller_id, subscriber_id = %subscriber.id, "Subscriber added");

    Ok((StatusCode::CREATED, Json(SubscribeResponse { subscribed: true })))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SubscribeResponse>> {
    let conn = state.db.get()?;
    queries::unsubscribe_by_token(&conn, &token)?
        .ok_or_else(|| AppError::NotFound(msg::SUBSCRIBER_NOT_FOUND.into()))?;
    Ok(Json(SubscribeResponse { subscribed: false }))
}
