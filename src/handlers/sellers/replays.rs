use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::email::ReplayAlert;
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::SellerContext;
use crate::models::{
    CreateReplay, EmbedMetadata, Platform, ReplayFilters, ReplayView, SubscriptionKind,
    UpdateReplay,
};
use crate::oembed::classify_url;
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::now;

pub async fn create_replay(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Json(input): Json<CreateReplay>,
) -> Result<(StatusCode, Json<ReplayView>)> {
    input.validate()?;

    {
        let conn = state.db.get()?;
        let entitled = queries::get_subscription(&conn, ctx.seller_id(), SubscriptionKind::Platform)?
            .is_some_and(|s| s.is_entitled());
        if !entitled {
            return Err(AppError::PaymentRequired(msg::SUBSCRIPTION_REQUIRED.into()));
        }
    }

    let (platform, url) = classify_url(&input.video_url)?;
    let embed = state.oembed.fetch(platform, &url).await.unwrap_or_default();

    let hours = input.expires_in_hours.unwrap_or(state.default_replay_hours);
    let new = queries::NewReplay {
        title: input.title.trim().to_string(),
        video_url: url.to_string(),
        platform,
        embed,
        expires_at: now() + hours * 3600,
    };

    let conn = state.db.get()?;
    let replay = queries::create_replay(&conn, ctx.seller_id(), &new)?;
    tracing::info!(seller_id = %ctx.seller_id(), replay_id = %replay.id, slug = %replay.slug, "Replay created");

    Ok((StatusCode::CREATED, Json(ReplayView::at(replay, now()))))
}

pub async fn list_replays(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(filters): Query<ReplayFilters>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<ReplayView>>> {
    let conn = state.db.get()?;
    let at = now();
    let (items, total) = queries::list_replays_paginated(
        &conn,
        ctx.seller_id(),
        filters.status,
        at,
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(page.page(items, total).map(|r| ReplayView::at(r, at))))
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ReplayPreview {
    pub platform: Platform,
    pub video_url: String,
    #[serde(flatten)]
    pub embed: EmbedMetadata,
}

/// Resolve a video link to its platform and display metadata without saving.
pub async fn preview_replay(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<ReplayPreview>> {
    let (platform, url) = classify_url(&query.url)?;
    let embed = state.oembed.fetch(platform, &url).await.unwrap_or_default();
    Ok(Json(ReplayPreview {
        platform,
        video_url: url.to_string(),
        embed,
    }))
}

pub async fn get_replay(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(id): Path<String>,
) -> Result<Json<ReplayView>> {
    let conn = state.db.get()?;
    let replay = queries::get_replay_for_seller(&conn, ctx.seller_id(), &id)?
        .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))?;
    Ok(Json(ReplayView::at(replay, now())))
}

pub async fn update_replay(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(id): Path<String>,
    Json(input): Json<UpdateReplay>,
) -> Result<Json<ReplayView>> {
    input.validate()?;
    let conn = state.db.get()?;

    let existing = queries::get_replay_for_seller(&conn, ctx.seller_id(), &id)?
        .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))?;
    if existing.archived_at.is_some() {
        return Err(AppError::Conflict(msg::REPLAY_ARCHIVED.into()));
    }

    let expires_at = input.expires_in_hours.map(|h| now() + h * 3600);
    let replay = queries::update_replay(&conn, &id, input.title.as_deref(), expires_at)?
        // Archived between the read and the update.
        .ok_or_else(|| AppError::Conflict(msg::REPLAY_ARCHIVED.into()))?;

    Ok(Json(ReplayView::at(replay, now())))
}

/// Archive a replay. Archiving twice is a no-op.
pub async fn archive_replay(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(id): Path<String>,
) -> Result<Json<ReplayView>> {
    let conn = state.db.get()?;
    queries::get_replay_for_seller(&conn, ctx.seller_id(), &id)?
        .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))?;

    if queries::archive_replay(&conn, &id)? {
        tracing::info!(seller_id = %ctx.seller_id(), replay_id = %id, "Replay archived");
    }

    let replay = queries::get_replay_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))?;
    Ok(Json(ReplayView::at(replay, now())))
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub recipients: usize,
}

/// Email every active subscriber that the replay is live. Once per replay.
pub async fn send_replay_alerts(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AlertsResponse>)> {
    let (replay, subscribers) = {
        let conn = state.db.get()?;
        let replay = queries::get_replay_for_seller(&conn, ctx.seller_id(), &id)?
            .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))?;
        if !replay.is_live_at(now()) {
            return Err(AppError::Conflict(msg::REPLAY_NOT_LIVE.into()));
        }
        if !queries::try_mark_alerts_sent(&conn, &replay.id)? {
            return Err(AppError::Conflict(msg::ALERTS_ALREADY_SENT.into()));
        }
        let subscribers = queries::list_active_subscribers(&conn, ctx.seller_id())?;
        (replay, subscribers)
    };

    let recipients = subscribers.len();
    let storefront_url = state.storefront_url(&replay.slug);
    let emails: Vec<_> = subscribers
        .into_iter()
        .map(|sub| {
            let content = ReplayAlert {
                seller_name: ctx.seller.name.clone(),
                replay_title: replay.title.clone(),
                storefront_url: storefront_url.clone(),
                expires_at: replay.expires_at,
                unsubscribe_url: state.unsubscribe_url(&sub.unsubscribe_token),
            }
            .render();
            (sub.email, content)
        })
        .collect();

    let email = state.email.clone();
    let replay_id = replay.id.clone();
    tokio::spawn(async move {
        let mut failed = 0usize;
        for (to, content) in emails {
            if let Err(e) = email.send(&to, &content).await {
                failed += 1;
                tracing::warn!(replay_id = %replay_id, "Replay alert failed: {}", e);
            }
        }
        tracing::info!(replay_id = %replay_id, recipients, failed, "Replay alerts dispatched");
    });

    Ok((StatusCode::ACCEPTED, Json(AlertsResponse { recipients })))
}
