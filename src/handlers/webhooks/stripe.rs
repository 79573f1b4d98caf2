use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::common::{
    ALREADY_PROCESSED, IGNORED, OK, WebhookResult, extract_signature, internal, parse, parse_object,
    verify_any,
};
use crate::db::{AppState, queries};
use crate::email::OrderConfirmation;
use crate::models::{Order, SubscriptionChange, SubscriptionStatus};
use crate::payments::{
    StripeCharge, StripeCheckoutSession, StripeInvoice, StripeSubscription, StripeWebhookEvent,
};
use crate::reconcile::{
    self, EventKey, OrderOutcome, SubscriptionOutcome, SubscriptionRefs, SubscriptionTarget,
};

pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    process(&state, &headers, &body).unwrap_or_else(|e| e)
}

fn process(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<WebhookResult, WebhookResult> {
    let signature = extract_signature(headers)?;
    verify_any(&state.webhook_secrets.snapshot, body, signature)?;

    let event: StripeWebhookEvent = parse(body)?;
    tracing::debug!(
        event_id = %event.id,
        event_type = %event.event_type,
        account = event.account.as_deref().unwrap_or("platform"),
        "Stripe event received"
    );

    let key = EventKey::stripe(&event.id, &event.event_type);
    let object = event.data.object;

    match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let session: StripeCheckoutSession = parse_object(object)?;
            match session.mode.as_deref() {
                Some("payment") => order_checkout_completed(state, key, &session),
                Some("subscription") => subscription_checkout_completed(state, key, &session, event.created),
                _ => Ok(IGNORED),
            }
        }
        "checkout.session.expired" => {
            let session: StripeCheckoutSession = parse_object(object)?;
            if session.mode.as_deref() != Some("payment") {
                return Ok(IGNORED);
            }
            let mut conn = state.db.get().map_err(|e| internal(e.into()))?;
            let Some(order_id) = order_reference(&conn, &session)? else {
                return Ok(IGNORED);
            };
            let outcome = reconcile::expire_order_checkout(&mut conn, key, &order_id).map_err(internal)?;
            Ok(order_result(&outcome, &order_id))
        }
        "charge.refunded" => {
            let charge: StripeCharge = parse_object(object)?;
            if !charge.is_fully_refunded() {
                tracing::info!(charge_id = %charge.id, "Partial refund ignored");
                return Ok((StatusCode::OK, "Partial refund ignored"));
            }
            let Some(ref payment_intent) = charge.payment_intent else {
                return Ok(IGNORED);
            };
            let mut conn = state.db.get().map_err(|e| internal(e.into()))?;
            let outcome = reconcile::refund_order(&mut conn, key, payment_intent).map_err(internal)?;
            if matches!(outcome, OrderOutcome::Refunded) {
                tracing::info!(payment_intent = %payment_intent, "Order refunded");
            }
            Ok(order_result(&outcome, payment_intent))
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let sub: StripeSubscription = parse_object(object)?;
            let status = if event.event_type == "customer.subscription.deleted" {
                SubscriptionStatus::Canceled
            } else {
                match sub.status.parse::<SubscriptionStatus>() {
                    Ok(status) => status,
                    Err(_) => {
                        tracing::warn!(subscription_id = %sub.id, status = %sub.status, "Unknown subscription status");
                        return Ok(IGNORED);
                    }
                }
            };

            let refs = SubscriptionRefs {
                metadata: Some(&sub.metadata),
                customer_account: sub.customer_account.as_deref(),
                customer: sub.customer.as_deref(),
                subscription_id: Some(&sub.id),
            };
            let change = SubscriptionChange {
                stripe_subscription_id: sub.id.clone(),
                status: Some(status),
                price_id: sub.price_id(),
                current_period_end: sub.period_end(),
                cancel_at_period_end: Some(sub.cancel_at_period_end),
                event_at: event.created,
            };
            apply_subscription(state, key, &refs, &change)
        }
        "invoice.paid" | "invoice.payment_failed" => {
            let invoice: StripeInvoice = parse_object(object)?;
            let Some(subscription_id) = invoice.subscription_id() else {
                return Ok((StatusCode::OK, "Not a subscription invoice"));
            };

            let paid = event.event_type == "invoice.paid";
            let change = SubscriptionChange {
                stripe_subscription_id: subscription_id.to_string(),
                status: match (paid, invoice.amount_paid) {
                    // Zero-amount invoices (trials) don't say anything about the status.
                    (true, 0) => None,
                    (true, _) => Some(SubscriptionStatus::Active),
                    (false, _) => Some(SubscriptionStatus::PastDue),
                },
                price_id: None,
                current_period_end: if paid { invoice.period_end() } else { None },
                cancel_at_period_end: None,
                event_at: event.created,
            };
            let refs = SubscriptionRefs {
                metadata: invoice.subscription_metadata(),
                customer_account: invoice.customer_account.as_deref(),
                customer: invoice.customer.as_deref(),
                subscription_id: Some(subscription_id),
            };
            apply_subscription(state, key, &refs, &change)
        }
        _ => Ok(IGNORED),
    }
}

/// The order a payment session belongs to: its metadata, or the stored session id.
fn order_reference(
    conn: &rusqlite::Connection,
    session: &StripeCheckoutSession,
) -> Result<Option<String>, WebhookResult> {
    if let Some(order_id) = session.metadata.get("order_id") {
        return Ok(Some(order_id.clone()));
    }
    let order = queries::get_order_by_checkout_session(conn, &session.id).map_err(internal)?;
    if order.is_none() {
        tracing::warn!(session_id = %session.id, "Payment checkout without order reference");
    }
    Ok(order.map(|o| o.id))
}

fn order_result(outcome: &OrderOutcome, reference: &str) -> WebhookResult {
    match outcome {
        OrderOutcome::Duplicate => ALREADY_PROCESSED,
        OrderOutcome::NotFound => {
            tracing::warn!(reference, "Webhook for unknown order");
            (StatusCode::OK, "Order not found")
        }
        _ => OK,
    }
}

fn order_checkout_completed(
    state: &AppState,
    key: EventKey,
    session: &StripeCheckoutSession,
) -> Result<WebhookResult, WebhookResult> {
    // Delayed payment methods complete the session before the money moves.
    if session.payment_status.as_deref() == Some("unpaid") {
        return Ok((StatusCode::OK, "Payment pending"));
    }
    let mut conn = state.db.get().map_err(|e| internal(e.into()))?;
    let Some(order_id) = order_reference(&conn, session)? else {
        return Ok(IGNORED);
    };

    let outcome = reconcile::complete_order_checkout(
        &mut conn,
        key,
        &order_id,
        session.payment_intent.as_deref(),
        session.buyer_email(),
    )
    .map_err(internal)?;
    drop(conn);

    if let Some(order) = outcome.paid_order() {
        tracing::info!(order_id = %order.id, total_cents = order.total_cents, "Order paid");
        spawn_order_confirmation(state.clone(), order.clone());
    }
    Ok(order_result(&outcome, &order_id))
}

fn subscription_checkout_completed(
    state: &AppState,
    key: EventKey,
    session: &StripeCheckoutSession,
    event_at: i64,
) -> Result<WebhookResult, WebhookResult> {
    let Some(ref subscription_id) = session.subscription else {
        return Ok(IGNORED);
    };

    let mut conn = state.db.get().map_err(|e| internal(e.into()))?;
    let refs = SubscriptionRefs {
        metadata: Some(&session.metadata),
        customer_account: session.customer_account.as_deref(),
        customer: session.customer.as_deref(),
        subscription_id: Some(subscription_id),
    };
    let Some(target) = resolve(&conn, &refs)? else {
        return Ok((StatusCode::OK, "Seller not found"));
    };

    let outcome = reconcile::complete_subscription_checkout(
        &mut conn,
        key,
        &target,
        subscription_id,
        session.customer.as_deref(),
        event_at,
    )
    .map_err(internal)?;
    Ok(subscription_result(&outcome))
}

fn resolve(
    conn: &rusqlite::Connection,
    refs: &SubscriptionRefs,
) -> Result<Option<SubscriptionTarget>, WebhookResult> {
    let target = reconcile::resolve_target(conn, refs).map_err(internal)?;
    if target.is_none() {
        tracing::warn!(
            subscription_id = refs.subscription_id.unwrap_or_default(),
            customer = refs.customer.unwrap_or_default(),
            customer_account = refs.customer_account.unwrap_or_default(),
            "Subscription event for unknown seller"
        );
    }
    Ok(target)
}

fn apply_subscription(
    state: &AppState,
    key: EventKey,
    refs: &SubscriptionRefs,
    change: &SubscriptionChange,
) -> Result<WebhookResult, WebhookResult> {
    let mut conn = state.db.get().map_err(|e| internal(e.into()))?;
    let Some(target) = resolve(&conn, refs)? else {
        return Ok((StatusCode::OK, "Seller not found"));
    };
    let outcome = reconcile::apply_subscription_change(&mut conn, key, &target, change).map_err(internal)?;
    Ok(subscription_result(&outcome))
}

fn subscription_result(outcome: &SubscriptionOutcome) -> WebhookResult {
    match outcome {
        SubscriptionOutcome::Applied(_) => OK,
        SubscriptionOutcome::Stale => (StatusCode::OK, "Stale event ignored"),
        SubscriptionOutcome::Duplicate => ALREADY_PROCESSED,
    }
}

/// Email the buyer their receipt. Runs after the webhook has committed.
fn spawn_order_confirmation(state: AppState, order: Order) {
    let Some(to) = order.buyer_email.clone() else {
        return;
    };

    tokio::spawn(async move {
        let content = {
            let conn = match state.db.get() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(order_id = %order.id, "Confirmation email skipped: {}", e);
                    return;
                }
            };
            let seller_name = queries::get_seller_by_id(&conn, &order.seller_id)
                .ok()
                .flatten()
                .map(|s| s.name)
                .unwrap_or_default();
            let product_name = queries::get_product_including_deleted(&conn, &order.product_id)
                .ok()
                .flatten()
                .map(|p| p.name)
                .unwrap_or_default();
            OrderConfirmation {
                order_id: order.id.clone(),
                seller_name,
                product_name,
                quantity: order.quantity,
                total_cents: order.total_cents,
                currency: order.currency.clone(),
            }
            .render()
        };

        if let Err(e) = state.email.send(&to, &content).await {
            tracing::warn!(order_id = %order.id, "Order confirmation email failed: {}", e);
        }
    });
}
