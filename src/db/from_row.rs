//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const SELLER_COLS: &str =
    "id, email, name, api_key_prefix, stripe_customer_id, created_at, updated_at";

pub const SUBSCRIPTION_COLS: &str = "seller_id, kind, stripe_subscription_id, status, price_id, current_period_end, cancel_at_period_end, last_event_at, created_at, updated_at";

pub const CONNECTED_ACCOUNT_COLS: &str =
    "seller_id, stripe_account_id, card_payments, requirements_due, synced_at, created_at, updated_at";

pub const REPLAY_COLS: &str = "id, seller_id, slug, title, video_url, platform, embed_title, author_name, thumbnail_url, expires_at, archived_at, alerts_sent_at, created_at, updated_at";

pub const PRODUCT_COLS: &str = "id, replay_id, seller_id, name, description, price_cents, currency, stock, sold, image_url, created_at, updated_at, deleted_at";

pub const ORDER_COLS: &str = "id, seller_id, replay_id, product_id, buyer_email, quantity, total_cents, currency, status, checkout_session_id, payment_intent_id, connected_account_id, paid_at, created_at, updated_at";

pub const SUBSCRIBER_COLS: &str =
    "id, seller_id, email, source_replay_id, unsubscribe_token, created_at, unsubscribed_at";

pub const WEBHOOK_EVENT_COLS: &str = "source, event_id, event_type, received_at";

// ============ FromRow Implementations ============

impl FromRow for Seller {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Seller {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            api_key_prefix: row.get(3)?,
            stripe_customer_id: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            seller_id: row.get(0)?,
            kind: parse_enum(row, 1, "kind")?,
            stripe_subscription_id: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            price_id: row.get(4)?,
            current_period_end: row.get(5)?,
            cancel_at_period_end: row.get::<_, i32>(6)? != 0,
            last_event_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for ConnectedAccount {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ConnectedAccount {
            seller_id: row.get(0)?,
            stripe_account_id: row.get(1)?,
            card_payments: parse_enum(row, 2, "card_payments")?,
            requirements_due: row.get::<_, i32>(3)? != 0,
            synced_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for Replay {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Replay {
            id: row.get(0)?,
            seller_id: row.get(1)?,
            slug: row.get(2)?,
            title: row.get(3)?,
            video_url: row.get(4)?,
            platform: parse_enum(row, 5, "platform")?,
            embed_title: row.get(6)?,
            author_name: row.get(7)?,
            thumbnail_url: row.get(8)?,
            expires_at: row.get(9)?,
            archived_at: row.get(10)?,
            alerts_sent_at: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            replay_id: row.get(1)?,
            seller_id: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            price_cents: row.get(5)?,
            currency: row.get(6)?,
            stock: row.get(7)?,
            sold: row.get(8)?,
            image_url: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            deleted_at: row.get(12)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            seller_id: row.get(1)?,
            replay_id: row.get(2)?,
            product_id: row.get(3)?,
            buyer_email: row.get(4)?,
            quantity: row.get(5)?,
            total_cents: row.get(6)?,
            currency: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            checkout_session_id: row.get(9)?,
            payment_intent_id: row.get(10)?,
            connected_account_id: row.get(11)?,
            paid_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for Subscriber {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscriber {
            id: row.get(0)?,
            seller_id: row.get(1)?,
            email: row.get(2)?,
            source_replay_id: row.get(3)?,
            unsubscribe_token: row.get(4)?,
            created_at: row.get(5)?,
            unsubscribed_at: row.get(6)?,
        })
    }
}

impl FromRow for WebhookEventRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEventRecord {
            source: row.get(0)?,
            event_id: row.get(1)?,
            event_type: row.get(2)?,
            received_at: row.get(3)?,
        })
    }
}
