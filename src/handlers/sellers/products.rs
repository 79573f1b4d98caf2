use axum::{
    extract::{Extension, State},
    http::StatusCode,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::SellerContext;
use crate::models::{CreateProduct, Product, UpdateProduct};

pub async fn create_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(replay_id): Path<String>,
    Json(input): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    input.validate()?;
    let conn = state.db.get()?;

    let replay = queries::get_replay_for_seller(&conn, ctx.seller_id(), &replay_id)?
        .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))?;
    if replay.archived_at.is_some() {
        return Err(AppError::Conflict(msg::REPLAY_ARCHIVED.into()));
    }

    let product = queries::create_product(&conn, &replay, &input)?;
    tracing::info!(replay_id = %replay.id, product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn list_products(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(replay_id): Path<String>,
) -> Result<Json<Vec<Product>>> {
    let conn = state.db.get()?;
    queries::get_replay_for_seller(&conn, ctx.seller_id(), &replay_id)?
        .ok_or_else(|| AppError::NotFound(msg::REPLAY_NOT_FOUND.into()))?;
    Ok(Json(queries::list_products_for_replay(&conn, &replay_id)?))
}

/// Stock set here is the number of units still available; units held by
/// pending orders are not included.
pub async fn update_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(id): Path<String>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    input.validate()?;
    let conn = state.db.get()?;

    queries::get_product_for_seller(&conn, ctx.seller_id(), &id)?
        .ok_or_else(|| AppError::NotFound(msg::PRODUCT_NOT_FOUND.into()))?;

    let product = queries::update_product(&conn, &id, &input)?
        .ok_or_else(|| AppError::NotFound(msg::PRODUCT_NOT_FOUND.into()))?;
    Ok(Json(product))
}

/// Soft delete. Orders keep referencing the product.
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    queries::get_product_for_seller(&conn, ctx.seller_id(), &id)?
        .ok_or_else(|| AppError::NotFound(msg::PRODUCT_NOT_FOUND.into()))?;

    if queries::count_pending_orders_for_product(&conn, &id)? > 0 {
        return Err(AppError::Conflict(msg::PRODUCT_HAS_PENDING_ORDERS.into()));
    }

    queries::soft_delete_product(&conn, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
