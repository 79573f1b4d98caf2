use axum::extract::State;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::{Platform, Replay, ReplayStatus, StorefrontProduct};
use crate::util::now;

/// Public view of a replay. Seller internals and ids are left out.
#[derive(Debug, Serialize)]
pub struct StorefrontReplay {
    pub slug: String,
    pub title: String,
    pub video_url: String,
    pub platform: Platform,
    pub embed_title: Option<String>,
    pub author_name: Option<String>,
    pub thumbnail_url: Option<String>,
    pub expires_at: i64,
    pub status: ReplayStatus,
}

#[derive(Debug, Serialize)]
pub struct Storefront {
    pub seller_name: String,
    pub replay: StorefrontReplay,
    pub products: Vec<StorefrontProduct>,
}

/// Load a replay by slug, treating archived replays as missing.
pub(super) fn visible_replay(conn: &rusqlite::Connection, slug: &str) -> Result<Replay> {
    queries::get_replay_by_slug(conn, slug)?
        .filter(|r| r.archived_at.is_none())
        .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))
}

pub async fn get_storefront(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Storefront>> {
    let conn = state.db.get()?;
    let replay = visible_replay(&conn, &slug)?;

    let status = replay.status_at(now());
    if status == ReplayStatus::Expired {
        return Err(AppError::Gone(msg::REPLAY_EXPIRED.into()));
    }

    let seller_name = queries::get_seller_by_id(&conn, &replay.seller_id)?
        .map(|s| s.name)
        .unwrap_or_default();
    let products = queries::list_products_for_replay(&conn, &replay.id)?
        .into_iter()
        .map(StorefrontProduct::from)
        .collect();

    Ok(Json(Storefront {
        seller_name,
        replay: StorefrontReplay {
            slug: replay.slug,
            title: replay.title,
            video_url: replay.video_url,
            platform: replay.platform,
            embed_title: replay.embed_title,
            author_name: replay.author_name,
            thumbnail_url: replay.thumbnail_url,
            expires_at: replay.expires_at,
            status,
        },
        products,
    }))
}
