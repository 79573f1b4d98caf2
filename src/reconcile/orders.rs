use rusqlite::Connection;

use super::EventKey;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{Order, OrderStatus};

/// Result of applying an order-related event.
#[derive(Debug)]
pub enum OrderOutcome {
    /// A pending order was paid.
    Paid(Order),
    /// Payment completed after the order had expired and released its stock.
    /// `oversold` is how many units weren't actually available any more.
    LatePaid { order: Order, oversold: i64 },
    Expired,
    Refunded,
    /// The order is already past the state this event would move it to.
    AlreadySettled,
    NotFound,
    Duplicate,
}

impl OrderOutcome {
    /// The order to send a confirmation email for, if the event completed a payment.
    pub fn paid_order(&self) -> Option<&Order> {
        match self {
            OrderOutcome::Paid(order) | OrderOutcome::LatePaid { order, .. } => Some(order),
            _ => None,
        }
    }
}

fn reload(conn: &Connection, order_id: &str) -> Result<Order> {
    queries::get_order_by_id(conn, order_id)?
        .ok_or_else(|| AppError::Internal(format!("Order {} vanished mid-transaction", order_id)))
}

/// Apply a completed buyer checkout.
pub fn complete_order_checkout(
    conn: &mut Connection,
    event: EventKey,
    order_id: &str,
    payment_intent_id: Option<&str>,
    buyer_email: Option<&str>,
) -> Result<OrderOutcome> {
    let tx = conn.transaction()?;
    if !event.record(&tx)? {
        return Ok(OrderOutcome::Duplicate);
    }

    let Some(order) = queries::get_order_by_id(&tx, order_id)? else {
        return Ok(OrderOutcome::NotFound);
    };

    let outcome = match order.status {
        OrderStatus::Pending => {
            queries::try_mark_order_paid(&tx, &order.id, OrderStatus::Pending, payment_intent_id, buyer_email)?;
            queries::adjust_sold(&tx, &order.product_id, order.quantity)?;
            OrderOutcome::Paid(reload(&tx, &order.id)?)
        }
        OrderStatus::Expired => {
            // The sweeper already gave the units back; take them again.
            let oversold = queries::take_stock_clamped(&tx, &order.product_id, order.quantity)?;
            queries::try_mark_order_paid(&tx, &order.id, OrderStatus::Expired, payment_intent_id, buyer_email)?;
            queries::adjust_sold(&tx, &order.product_id, order.quantity)?;
            if oversold > 0 {
                tracing::warn!(
                    order_id = %order.id,
                    product_id = %order.product_id,
                    oversold,
                    "Late checkout completion oversold product"
                );
            }
            OrderOutcome::LatePaid {
                order: reload(&tx, &order.id)?,
                oversold,
            }
        }
        OrderStatus::Paid | OrderStatus::Refunded => OrderOutcome::AlreadySettled,
    };

    tx.commit()?;
    Ok(outcome)
}

/// Apply an abandoned checkout: a pending order expires and gives its stock back.
pub fn expire_order_checkout(conn: &mut Connection, event: EventKey, order_id: &str) -> Result<OrderOutcome> {
    let tx = conn.transaction()?;
    if !event.record(&tx)? {
        return Ok(OrderOutcome::Duplicate);
    }

    let Some(order) = queries::get_order_by_id(&tx, order_id)? else {
        return Ok(OrderOutcome::NotFound);
    };

    let outcome = if queries::try_mark_order_expired(&tx, &order.id)? {
        queries::release_stock(&tx, &order.product_id, order.quantity)?;
        OrderOutcome::Expired
    } else {
        OrderOutcome::AlreadySettled
    };

    tx.commit()?;
    Ok(outcome)
}

/// Apply a full refund. Refunded units are not returned to stock.
pub fn refund_order(conn: &mut Connection, event: EventKey, payment_intent_id: &str) -> Result<OrderOutcome> {
    let tx = conn.transaction()?;
    if !event.record(&tx)? {
        return Ok(OrderOutcome::Duplicate);
    }

    let Some(order) = queries::get_order_by_payment_intent(&tx, payment_intent_id)? else {
        return Ok(OrderOutcome::NotFound);
    };

    let outcome = if queries::try_mark_order_refunded(&tx, &order.id)? {
        queries::adjust_sold(&tx, &order.product_id, -order.quantity)?;
        OrderOutcome::Refunded
    } else {
        OrderOutcome::AlreadySettled
    };

    tx.commit()?;
    Ok(outcome)
}
