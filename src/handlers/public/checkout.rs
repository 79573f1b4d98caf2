use axum::extract::State;

use super::storefront::visible_replay;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::{CheckoutRequest, CheckoutResponse, CreateOrder, ReplayStatus};
use crate::payments::OrderCheckout;
use crate::util::{normalize_email, now};

/// How long a buyer has to pay before the checkout session lapses.
const CHECKOUT_SESSION_SECS: i64 = 30 * 60;

/// Start a buyer checkout for one product on a live replay.
///
/// Stock is reserved with the pending order. If the provider call fails the
/// order is expired again and its units go back to stock.
pub async fn create_checkout(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(input): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    input.validate()?;
    let gateway = state.payments()?;
    let buyer_email = input.email.as_deref().map(normalize_email);

    let (replay, product, order, account_id) = {
        let mut conn = state.db.get()?;
        let replay = visible_replay(&conn, &slug)?;
        match replay.status_at(now()) {
            ReplayStatus::Live => {}
            ReplayStatus::Expired => return Err(AppError::Gone(msg::REPLAY_EXPIRED.into())),
            ReplayStatus::Archived => return Err(AppError::NotFound(msg::REPLAY_NOT_FOUND.into())),
        }

        let product = queries::get_product_by_id(&conn, &input.product_id)?
            .filter(|p| p.replay_id == replay.id)
            .ok_or_else(|| AppError::NotFound(msg::PRODUCT_NOT_FOUND.into()))?;

        let account = queries::get_connected_account(&conn, &replay.seller_id)?
            .filter(|a| a.can_accept_payments())
            .ok_or_else(|| AppError::BadRequest(msg::SELLER_CANNOT_ACCEPT_PAYMENTS.into()))?;

        let order = queries::create_pending_order(
            &mut conn,
            &CreateOrder {
                seller_id: replay.seller_id.clone(),
                replay_id: replay.id.clone(),
                product_id: product.id.clone(),
                buyer_email: buyer_email.clone(),
                quantity: input.quantity,
                unit_price_cents: product.price_cents,
                currency: product.currency.clone(),
                connected_account_id: account.stripe_account_id.clone(),
            },
        )?;
        (replay, product, order, account.stripe_account_id)
    };

    let storefront_url = state.storefront_url(&replay.slug);
    let request = OrderCheckout {
        connected_account_id: account_id,
        order_id: order.id.clone(),
        product_name: product.name.clone(),
        unit_amount: product.price_cents,
        currency: product.currency.clone(),
        quantity: order.quantity,
        application_fee: state.billing.application_fee(order.total_cents),
        customer_email: buyer_email,
        success_url: format!("{}?order={}&checkout=success", storefront_url, order.id),
        cancel_url: format!("{}?order={}&checkout=canceled", storefront_url, order.id),
        expires_at: now() + CHECKOUT_SESSION_SECS,
    };

    let link = match gateway.create_order_checkout(&request).await {
        Ok(link) => link,
        Err(e) => {
            tracing::error!(order_id = %order.id, "Order checkout creation failed: {}", e);
            let mut conn = state.db.get()?;
            queries::release_pending_order(&mut conn, &order.id)?;
            return Err(match e {
                AppError::Upstream(_) => e,
                other => AppError::Upstream(other.to_string()),
            });
        }
    };

    let conn = state.db.get()?;
    queries::set_order_checkout_session(&conn, &order.id, &link.id)?;
    tracing::info!(
        order_id = %order.id,
        product_id = %product.id,
        quantity = order.quantity,
        session_id = %link.id,
        "Buyer checkout created"
    );

    Ok(Json(CheckoutResponse {
        order_id: order.id,
        url: link.url,
    }))
}
