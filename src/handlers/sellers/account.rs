use axum::extract::{Extension, State};
use rusqlite::Connection;
use serde::Serialize;

use super::UrlResponse;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::SellerContext;
use crate::models::{ConnectedAccount, Seller, SellerOverview, SubscriptionKind};
use crate::payments::{BillingTarget, SubscriptionCheckout};
use crate::reconcile::{AccountOutcome, sync_connected_account};

pub fn load_overview(conn: &Connection, seller: Seller) -> Result<SellerOverview> {
    let platform_subscription = queries::get_subscription(conn, &seller.id, SubscriptionKind::Platform)?;
    let connect_subscription = queries::get_subscription(conn, &seller.id, SubscriptionKind::Connect)?;
    let connected_account = queries::get_connected_account(conn, &seller.id)?;

    let can_publish = platform_subscription.as_ref().is_some_and(|s| s.is_entitled());
    let can_accept_payments = connected_account
        .as_ref()
        .is_some_and(ConnectedAccount::can_accept_payments);

    Ok(SellerOverview {
        seller,
        platform_subscription,
        connected_account,
        connect_subscription,
        can_accept_payments,
        can_publish,
    })
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<SellerOverview>> {
    let conn = state.db.get()?;
    // Re-read so billing links made after authentication are visible.
    let seller = queries::get_seller_by_id(&conn, ctx.seller_id())?.unwrap_or(ctx.seller);
    Ok(Json(load_overview(&conn, seller)?))
}

/// Start checkout for the seller's ReplaySell plan.
pub async fn create_billing_checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<UrlResponse>> {
    let gateway = state.payments()?;
    let price_id = state
        .billing
        .platform_price_id
        .clone()
        .ok_or_else(|| AppError::BadRequest(msg::PLATFORM_PRICE_NOT_CONFIGURED.into()))?;

    let seller = {
        let conn = state.db.get()?;
        if queries::get_subscription(&conn, ctx.seller_id(), SubscriptionKind::Platform)?
            .is_some_and(|s| s.is_entitled())
        {
            return Err(AppError::Conflict(msg::SUBSCRIPTION_ALREADY_ACTIVE.into()));
        }
        queries::get_seller_by_id(&conn, ctx.seller_id())?
            .ok_or_else(|| AppError::NotFound("Seller not found".into()))?
    };

    let customer_id = match seller.stripe_customer_id {
        Some(id) => id,
        None => {
            let created = gateway
                .create_customer(&seller.email, &seller.name, &seller.id)
                .await?;
            let conn = state.db.get()?;
            if queries::set_seller_stripe_customer(&conn, &seller.id, &created)? {
                tracing::info!(seller_id = %seller.id, customer_id = %created, "Created billing customer");
                created
            } else {
                // A concurrent request linked a customer first; use that one.
                queries::get_seller_by_id(&conn, &seller.id)?
                    .and_then(|s| s.stripe_customer_id)
                    .unwrap_or(created)
            }
        }
    };

    let link = gateway
        .create_subscription_checkout(&SubscriptionCheckout {
            target: BillingTarget::Customer(customer_id),
            price_id,
            seller_id: seller.id.clone(),
            kind: SubscriptionKind::Platform,
            success_url: format!("{}/dashboard?billing=success", state.base_url),
            cancel_url: format!("{}/dashboard?billing=canceled", state.base_url),
        })
        .await?;

    tracing::info!(seller_id = %seller.id, session_id = %link.id, "Platform subscription checkout created");
    Ok(Json(UrlResponse { url: link.url }))
}

pub async fn create_billing_portal(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<UrlResponse>> {
    let gateway = state.payments()?;
    let customer_id = {
        let conn = state.db.get()?;
        queries::get_seller_by_id(&conn, ctx.seller_id())?
            .and_then(|s| s.stripe_customer_id)
            .ok_or_else(|| AppError::BadRequest(msg::NO_BILLING_CUSTOMER.into()))?
    };

    let url = gateway
        .create_billing_portal_session(&customer_id, &format!("{}/dashboard", state.base_url))
        .await?;
    Ok(Json(UrlResponse { url }))
}

#[derive(Debug, Serialize)]
pub struct OnboardResponse {
    pub account_id: String,
    pub url: String,
}

/// Create the seller's connected account if needed and return an onboarding link.
pub async fn onboard_connected_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<OnboardResponse>> {
    let gateway = state.payments()?;
    let existing = {
        let conn = state.db.get()?;
        queries::get_connected_account(&conn, ctx.seller_id())?
    };

    let account = match existing {
        Some(account) => account,
        None => {
            let seller = &ctx.seller;
            let account_id = gateway
                .create_connected_account(&seller.email, &seller.name, &seller.id)
                .await?;
            // Persist right away; capability state arrives via thin events or refresh.
            let conn = state.db.get()?;
            let account = queries::create_connected_account(&conn, &seller.id, &account_id)?;
            if account.stripe_account_id != account_id {
                tracing::warn!(
                    seller_id = %seller.id,
                    orphaned_account_id = %account_id,
                    "Seller already had a connected account; keeping the existing one"
                );
            } else {
                tracing::info!(seller_id = %seller.id, account_id = %account_id, "Connected account created");
            }
            account
        }
    };

    let url = gateway
        .create_account_link(
            &account.stripe_account_id,
            &format!("{}/dashboard?connect=refresh", state.base_url),
            &format!("{}/dashboard?connect=return", state.base_url),
        )
        .await?;

    Ok(Json(OnboardResponse {
        account_id: account.stripe_account_id,
        url,
    }))
}

/// Re-sync the connected account's capabilities from the provider.
pub async fn refresh_connected_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<ConnectedAccount>> {
    let gateway = state.payments()?;
    let account = {
        let conn = state.db.get()?;
        queries::get_connected_account(&conn, ctx.seller_id())?
            .ok_or_else(|| AppError::BadRequest(msg::NO_CONNECTED_ACCOUNT.into()))?
    };

    match sync_connected_account(&state.db, gateway.as_ref(), &account.stripe_account_id).await? {
        AccountOutcome::Synced(account) => Ok(Json(account)),
        AccountOutcome::Unknown | AccountOutcome::Duplicate => {
            Err(AppError::BadRequest(msg::NO_CONNECTED_ACCOUNT.into()))
        }
    }
}

/// Start checkout for the plan billed to the seller's connected account.
pub async fn create_connect_subscription_checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<UrlResponse>> {
    let gateway = state.payments()?;
    let price_id = state
        .billing
        .connect_price_id
        .clone()
        .ok_or_else(|| AppError::BadRequest(msg::CONNECT_PRICE_NOT_CONFIGURED.into()))?;

    let account = {
        let conn = state.db.get()?;
        let account = queries::get_connected_account(&conn, ctx.seller_id())?
            .ok_or_else(|| AppError::BadRequest(msg::NO_CONNECTED_ACCOUNT.into()))?;
        if queries::get_subscription(&conn, ctx.seller_id(), SubscriptionKind::Connect)?
            .is_some_and(|s| s.is_entitled())
        {
            return Err(AppError::Conflict(msg::SUBSCRIPTION_ALREADY_ACTIVE.into()));
        }
        account
    };

    let link = gateway
        .create_subscription_checkout(&SubscriptionCheckout {
            target: BillingTarget::CustomerAccount(account.stripe_account_id),
            price_id,
            seller_id: ctx.seller.id.clone(),
            kind: SubscriptionKind::Connect,
            success_url: format!("{}/dashboard?connect_billing=success", state.base_url),
            cancel_url: format!("{}/dashboard?connect_billing=canceled", state.base_url),
        })
        .await?;

    Ok(Json(UrlResponse { url: link.url }))
}
