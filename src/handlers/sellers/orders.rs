use axum::extract::{Extension, State};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::SellerContext;
use crate::models::{Order, OrderFilters, Subscriber};
use crate::pagination::{Paginated, PaginationQuery};

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(filters): Query<OrderFilters>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<Order>>> {
    let conn = state.db.get()?;
    let (items, total) =
        queries::list_orders_paginated(&conn, ctx.seller_id(), &filters, page.limit(), page.offset())?;
    Ok(Json(page.page(items, total)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    let conn = state.db.get()?;
    let order = queries::get_order_by_id(&conn, &id)?
        .filter(|o| o.seller_id == ctx.seller_id())
        .ok_or_else(|| AppError::NotFound(msg::ORDER_NOT_FOUND.into()))?;
    Ok(Json(order))
}

/// Active subscribers, newest first.
pub async fn list_subscribers(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<Subscriber>>> {
    let conn = state.db.get()?;
    let (items, total) =
        queries::list_subscribers_paginated(&conn, ctx.seller_id(), page.limit(), page.offset())?;
    Ok(Json(page.page(items, total)))
}
