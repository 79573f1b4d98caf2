use rusqlite::{Connection, OptionalExtension, params, types::Value};
use uuid::Uuid;

use crate::crypto::{api_key_prefix, generate_api_key, generate_token, hash_secret, short_suffix};
use crate::error::{AppError, Result, msg};
use crate::models::*;
use crate::util::{normalize_email, now, slugify};

use super::from_row::{
    CONNECTED_ACCOUNT_COLS, FromRow, ORDER_COLS, PRODUCT_COLS, REPLAY_COLS, SELLER_COLS,
    SUBSCRIBER_COLS, SUBSCRIPTION_COLS, WEBHOOK_EVENT_COLS, query_all, query_one,
};

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    extra_filter: Option<&'static str>,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            extra_filter: None,
        }
    }

    /// Additional WHERE condition (e.g. "deleted_at IS NULL").
    fn filter(mut self, condition: &'static str) -> Self {
        self.extra_filter = Some(condition);
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value (including NULL).
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    /// Execute the update and return the updated row, or None if no row matched.
    /// With no fields set, only `updated_at` is touched so the row is still returned.
    fn execute_returning<T: FromRow>(mut self, conn: &Connection, cols: &str) -> Result<Option<T>> {
        self.fields.push(("updated_at", now().into()));
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let filter = self
            .extra_filter
            .map(|f| format!(" AND {}", f))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{} RETURNING {}",
            self.table,
            sets.join(", "),
            filter,
            cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

// ============ Sellers ============

/// Create a seller and return it with the plaintext API key (shown once).
pub fn create_seller(conn: &Connection, input: &CreateSeller) -> Result<(Seller, String)> {
    let email = normalize_email(&input.email);
    if get_seller_by_email(conn, &email)?.is_some() {
        return Err(AppError::Conflict("A seller with this email already exists".into()));
    }

    let id = gen_id();
    let now = now();
    let api_key = generate_api_key();
    let prefix = api_key_prefix(&api_key);
    let name = input.name.trim().to_string();

    conn.execute(
        "INSERT INTO sellers (id, email, name, api_key_prefix, api_key_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![&id, &email, &name, &prefix, hash_secret(&api_key), now],
    )?;

    Ok((
        Seller {
            id,
            email,
            name,
            api_key_prefix: prefix,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        },
        api_key,
    ))
}

pub fn get_seller_by_id(conn: &Connection, id: &str) -> Result<Option<Seller>> {
    query_one(
        conn,
        &format!("SELECT {} FROM sellers WHERE id = ?1", SELLER_COLS),
        &[&id],
    )
}

pub fn get_seller_by_email(conn: &Connection, email: &str) -> Result<Option<Seller>> {
    let email = normalize_email(email);
    query_one(
        conn,
        &format!("SELECT {} FROM sellers WHERE email = ?1", SELLER_COLS),
        &[&email],
    )
}

pub fn get_seller_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<Seller>> {
    let hash = hash_secret(api_key);
    query_one(
        conn,
        &format!("SELECT {} FROM sellers WHERE api_key_hash = ?1", SELLER_COLS),
        &[&hash],
    )
}

pub fn get_seller_by_stripe_customer(conn: &Connection, customer_id: &str) -> Result<Option<Seller>> {
    query_one(
        conn,
        &format!("SELECT {} FROM sellers WHERE stripe_customer_id = ?1", SELLER_COLS),
        &[&customer_id],
    )
}

/// Link a platform billing customer to a seller. Never overwrites an existing link.
/// Returns true if the link was written.
pub fn set_seller_stripe_customer(conn: &Connection, seller_id: &str, customer_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE sellers SET stripe_customer_id = ?1, updated_at = ?2
         WHERE id = ?3 AND stripe_customer_id IS NULL",
        params![customer_id, now(), seller_id],
    )?;
    Ok(affected > 0)
}

pub fn count_sellers(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM sellers", [], |row| row.get(0))
        .map_err(Into::into)
}

// ============ Subscriptions ============

pub fn get_subscription(
    conn: &Connection,
    seller_id: &str,
    kind: SubscriptionKind,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE seller_id = ?1 AND kind = ?2",
            SUBSCRIPTION_COLS
        ),
        &[&seller_id, &kind.as_ref()],
    )
}

pub fn get_subscription_by_stripe_id(
    conn: &Connection,
    stripe_subscription_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE stripe_subscription_id = ?1 ORDER BY updated_at DESC LIMIT 1",
            SUBSCRIPTION_COLS
        ),
        &[&stripe_subscription_id],
    )
}

/// Write the full subscription row for (seller, kind). The caller decides
/// whether the change should win; this only persists it.
pub fn save_subscription(conn: &Connection, sub: &Subscription) -> Result<()> {
    conn.execute(
        "INSERT INTO subscriptions (seller_id, kind, stripe_subscription_id, status, price_id,
                                    current_period_end, cancel_at_period_end, last_event_at,
                                    created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(seller_id, kind) DO UPDATE SET
            stripe_subscription_id = excluded.stripe_subscription_id,
            status = excluded.status,
            price_id = excluded.price_id,
            current_period_end = excluded.current_period_end,
            cancel_at_period_end = excluded.cancel_at_period_end,
            last_event_at = excluded.last_event_at,
            updated_at = excluded.updated_at",
        params![
            &sub.seller_id,
            sub.kind.as_ref(),
            &sub.stripe_subscription_id,
            sub.status.as_ref(),
            &sub.price_id,
            sub.current_period_end,
            sub.cancel_at_period_end as i32,
            sub.last_event_at,
            sub.created_at,
            sub.updated_at,
        ],
    )?;
    Ok(())
}

// ============ Connected Accounts ============

pub fn get_connected_account(conn: &Connection, seller_id: &str) -> Result<Option<ConnectedAccount>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM connected_accounts WHERE seller_id = ?1",
            CONNECTED_ACCOUNT_COLS
        ),
        &[&seller_id],
    )
}

pub fn get_connected_account_by_stripe_id(
    conn: &Connection,
    stripe_account_id: &str,
) -> Result<Option<ConnectedAccount>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM connected_accounts WHERE stripe_account_id = ?1",
            CONNECTED_ACCOUNT_COLS
        ),
        &[&stripe_account_id],
    )
}

/// Record a newly created connected account. If the seller already has one,
/// the existing row is kept and returned.
pub fn create_connected_account(
    conn: &Connection,
    seller_id: &str,
    stripe_account_id: &str,
) -> Result<ConnectedAccount> {
    let now = now();
    conn.execute(
        "INSERT OR IGNORE INTO connected_accounts (seller_id, stripe_account_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)",
        params![seller_id, stripe_account_id, now],
    )?;
    get_connected_account(conn, seller_id)?
        .ok_or_else(|| AppError::Internal("Connected account missing after insert".into()))
}

/// Overwrite capability state with a freshly fetched snapshot.
/// Returns None if the account isn't known.
pub fn apply_account_snapshot(
    conn: &Connection,
    snapshot: &AccountSnapshot,
) -> Result<Option<ConnectedAccount>> {
    let now = now();
    conn.query_row(
        &format!(
            "UPDATE connected_accounts
             SET card_payments = ?1, requirements_due = ?2, synced_at = ?3, updated_at = ?3
             WHERE stripe_account_id = ?4
             RETURNING {}",
            CONNECTED_ACCOUNT_COLS
        ),
        params![
            snapshot.card_payments.as_ref(),
            snapshot.requirements_due as i32,
            now,
            &snapshot.stripe_account_id,
        ],
        ConnectedAccount::from_row,
    )
    .optional()
    .map_err(Into::into)
}

// ============ Replays ============

/// Validated fields for a new replay.
#[derive(Debug, Clone)]
pub struct NewReplay {
    pub title: String,
    pub video_url: String,
    pub platform: Platform,
    pub embed: EmbedMetadata,
    pub expires_at: i64,
}

pub fn create_replay(conn: &Connection, seller_id: &str, input: &NewReplay) -> Result<Replay> {
    let id = gen_id();
    let now = now();
    let stem = slugify(&input.title);

    // Random suffix makes collisions rare; retry a few times anyway.
    for _ in 0..5 {
        let slug = format!("{}-{}", stem, short_suffix());
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO replays (id, seller_id, slug, title, video_url, platform,
                                            embed_title, author_name, thumbnail_url, expires_at,
                                            created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                &id,
                seller_id,
                &slug,
                input.title.trim(),
                &input.video_url,
                input.platform.as_ref(),
                &input.embed.title,
                &input.embed.author_name,
                &input.embed.thumbnail_url,
                input.expires_at,
                now,
            ],
        )?;
        if inserted > 0 {
            return get_replay_by_id(conn, &id)?
                .ok_or_else(|| AppError::Internal("Replay missing after insert".into()));
        }
    }

    Err(AppError::Internal("Could not generate a unique replay slug".into()))
}

pub fn get_replay_by_id(conn: &Connection, id: &str) -> Result<Option<Replay>> {
    query_one(
        conn,
        &format!("SELECT {} FROM replays WHERE id = ?1", REPLAY_COLS),
        &[&id],
    )
}

/// Replay owned by the given seller. Another seller's replay reads as not found.
pub fn get_replay_for_seller(conn: &Connection, seller_id: &str, id: &str) -> Result<Option<Replay>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM replays WHERE id = ?1 AND seller_id = ?2",
            REPLAY_COLS
        ),
        &[&id, &seller_id],
    )
}

pub fn get_replay_by_slug(conn: &Connection, slug: &str) -> Result<Option<Replay>> {
    query_one(
        conn,
        &format!("SELECT {} FROM replays WHERE slug = ?1", REPLAY_COLS),
        &[&slug],
    )
}

pub fn list_replays_paginated(
    conn: &Connection,
    seller_id: &str,
    status: Option<ReplayStatus>,
    at: i64,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Replay>, i64)> {
    let mut conditions = vec!["seller_id = ?"];
    let mut values: Vec<Value> = vec![seller_id.to_string().into()];

    match status {
        None => {}
        Some(ReplayStatus::Live) => {
            conditions.push("archived_at IS NULL AND expires_at > ?");
            values.push(at.into());
        }
        Some(ReplayStatus::Expired) => {
            conditions.push("archived_at IS NULL AND expires_at <= ?");
            values.push(at.into());
        }
        Some(ReplayStatus::Archived) => conditions.push("archived_at IS NOT NULL"),
    }

    let where_sql = format!("WHERE {}", conditions.join(" AND "));
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM replays {}", where_sql),
        rusqlite::params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(limit.into());
    values.push(offset.into());
    let sql = format!(
        "SELECT {} FROM replays {} ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        REPLAY_COLS, where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), Replay::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((items, total))
}

/// Update title and/or expiry. Archived replays are not matched.
pub fn update_replay(
    conn: &Connection,
    id: &str,
    title: Option<&str>,
    expires_at: Option<i64>,
) -> Result<Option<Replay>> {
    UpdateBuilder::new("replays", id)
        .filter("archived_at IS NULL")
        .set_opt("title", title.map(str::to_string))
        .set_opt("expires_at", expires_at)
        .execute_returning(conn, REPLAY_COLS)
}

pub fn archive_replay(conn: &Connection, id: &str) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "UPDATE replays SET archived_at = ?1, updated_at = ?1 WHERE id = ?2 AND archived_at IS NULL",
        params![now, id],
    )?;
    Ok(affected > 0)
}

/// Claim the one-time alert send for a replay. Returns false if already sent.
pub fn try_mark_alerts_sent(conn: &Connection, id: &str) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "UPDATE replays SET alerts_sent_at = ?1, updated_at = ?1 WHERE id = ?2 AND alerts_sent_at IS NULL",
        params![now, id],
    )?;
    Ok(affected > 0)
}

// ============ Products ============

pub fn create_product(conn: &Connection, replay: &Replay, input: &CreateProduct) -> Result<Product> {
    let id = gen_id();
    let now = now();
    let currency = input.currency_or_default();
    let name = input.name.trim().to_string();

    conn.execute(
        "INSERT INTO products (id, replay_id, seller_id, name, description, price_cents, currency,
                               stock, sold, image_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?10)",
        params![
            &id,
            &replay.id,
            &replay.seller_id,
            &name,
            &input.description,
            input.price_cents,
            &currency,
            input.stock,
            &input.image_url,
            now,
        ],
    )?;

    Ok(Product {
        id,
        replay_id: replay.id.clone(),
        seller_id: replay.seller_id.clone(),
        name,
        description: input.description.clone(),
        price_cents: input.price_cents,
        currency,
        stock: input.stock,
        sold: 0,
        image_url: input.image_url.clone(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Active (not deleted) product by id.
pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM products WHERE id = ?1 AND deleted_at IS NULL",
            PRODUCT_COLS
        ),
        &[&id],
    )
}

/// Product by id including soft-deleted ones (orders keep pointing at them).
pub fn get_product_including_deleted(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        &[&id],
    )
}

pub fn get_product_for_seller(conn: &Connection, seller_id: &str, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM products WHERE id = ?1 AND seller_id = ?2 AND deleted_at IS NULL",
            PRODUCT_COLS
        ),
        &[&id, &seller_id],
    )
}

pub fn list_products_for_replay(conn: &Connection, replay_id: &str) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM products WHERE replay_id = ?1 AND deleted_at IS NULL ORDER BY created_at, id",
            PRODUCT_COLS
        ),
        &[&replay_id],
    )
}

pub fn update_product(conn: &Connection, id: &str, input: &UpdateProduct) -> Result<Option<Product>> {
    let mut builder = UpdateBuilder::new("products", id)
        .filter("deleted_at IS NULL")
        .set_opt("name", input.name.as_ref().map(|n| n.trim().to_string()))
        .set_opt("price_cents", input.price_cents)
        .set_opt("currency", input.currency.as_ref().map(|c| c.to_ascii_lowercase()))
        .set_opt("stock", input.stock);
    if let Some(ref description) = input.description {
        builder = builder.set_nullable("description", description.clone());
    }
    if let Some(ref image_url) = input.image_url {
        builder = builder.set_nullable("image_url", image_url.clone());
    }
    builder.execute_returning(conn, PRODUCT_COLS)
}

pub fn soft_delete_product(conn: &Connection, id: &str) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "UPDATE products SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    Ok(affected > 0)
}

pub fn count_pending_orders_for_product(conn: &Connection, product_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE product_id = ?1 AND status = 'pending'",
        params![product_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Atomically take `quantity` units from stock. Returns false if not enough remain.
pub fn reserve_stock(conn: &Connection, product_id: &str, quantity: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE products SET stock = stock - ?1, updated_at = ?2
         WHERE id = ?3 AND deleted_at IS NULL AND stock >= ?1",
        params![quantity, now(), product_id],
    )?;
    Ok(affected > 0)
}

/// Return reserved units to stock.
pub fn release_stock(conn: &Connection, product_id: &str, quantity: i64) -> Result<()> {
    conn.execute(
        "UPDATE products SET stock = stock + ?1, updated_at = ?2 WHERE id = ?3",
        params![quantity, now(), product_id],
    )?;
    Ok(())
}

/// Take units that were already paid for, even if stock ran out in the meantime.
/// Stock never goes below zero; returns the number of units that were oversold.
pub fn take_stock_clamped(conn: &Connection, product_id: &str, quantity: i64) -> Result<i64> {
    let stock: Option<i64> = conn
        .query_row(
            "SELECT stock FROM products WHERE id = ?1",
            params![product_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stock) = stock else {
        return Ok(0);
    };
    conn.execute(
        "UPDATE products SET stock = MAX(stock - ?1, 0), updated_at = ?2 WHERE id = ?3",
        params![quantity, now(), product_id],
    )?;
    Ok((quantity - stock).max(0))
}

/// Adjust the sold counter by `delta` (negative for refunds). Never below zero.
pub fn adjust_sold(conn: &Connection, product_id: &str, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE products SET sold = MAX(sold + ?1, 0), updated_at = ?2 WHERE id = ?3",
        params![delta, now(), product_id],
    )?;
    Ok(())
}

// ============ Orders ============

/// Reserve stock and insert a pending order in one transaction.
pub fn create_pending_order(conn: &mut Connection, input: &CreateOrder) -> Result<Order> {
    let total_cents = input
        .unit_price_cents
        .checked_mul(input.quantity)
        .filter(|total| *total <= MAX_PRICE_CENTS)
        .ok_or_else(|| AppError::BadRequest(msg::ORDER_TOTAL_TOO_LARGE.into()))?;

    let tx = conn.transaction()?;

    if !reserve_stock(&tx, &input.product_id, input.quantity)? {
        return Err(AppError::Conflict(msg::OUT_OF_STOCK.into()));
    }

    let id = gen_id();
    let now = now();
    let buyer_email = input.buyer_email.as_deref().map(normalize_email);

    tx.execute(
        "INSERT INTO orders (id, seller_id, replay_id, product_id, buyer_email, quantity, total_cents,
                             currency, status, connected_account_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?10, ?10)",
        params![
            &id,
            &input.seller_id,
            &input.replay_id,
            &input.product_id,
            &buyer_email,
            input.quantity,
            total_cents,
            &input.currency,
            &input.connected_account_id,
            now,
        ],
    )?;

    tx.commit()?;

    Ok(Order {
        id,
        seller_id: input.seller_id.clone(),
        replay_id: input.replay_id.clone(),
        product_id: input.product_id.clone(),
        buyer_email,
        quantity: input.quantity,
        total_cents,
        currency: input.currency.clone(),
        status: OrderStatus::Pending,
        checkout_session_id: None,
        payment_intent_id: None,
        connected_account_id: Some(input.connected_account_id.clone()),
        paid_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn set_order_checkout_session(conn: &Connection, order_id: &str, session_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE orders SET checkout_session_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![session_id, now(), order_id],
    )?;
    Ok(())
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn get_order_by_checkout_session(conn: &Connection, session_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE checkout_session_id = ?1", ORDER_COLS),
        &[&session_id],
    )
}

pub fn get_order_by_payment_intent(conn: &Connection, payment_intent_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE payment_intent_id = ?1", ORDER_COLS),
        &[&payment_intent_id],
    )
}

pub fn list_orders_paginated(
    conn: &Connection,
    seller_id: &str,
    filters: &OrderFilters,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64)> {
    let mut conditions = vec!["seller_id = ?".to_string()];
    let mut values: Vec<Value> = vec![seller_id.to_string().into()];

    if let Some(status) = filters.status {
        conditions.push("status = ?".to_string());
        values.push(status.as_ref().to_string().into());
    }
    if let Some(ref replay_id) = filters.replay_id {
        conditions.push("replay_id = ?".to_string());
        values.push(replay_id.clone().into());
    }

    let where_sql = format!("WHERE {}", conditions.join(" AND "));
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM orders {}", where_sql),
        rusqlite::params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(limit.into());
    values.push(offset.into());
    let sql = format!(
        "SELECT {} FROM orders {} ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        ORDER_COLS, where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), Order::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((items, total))
}

/// Conditionally mark an order paid. Only applies if the order is currently in `from`.
/// Fills in the buyer email if the order didn't have one.
pub fn try_mark_order_paid(
    conn: &Connection,
    order_id: &str,
    from: OrderStatus,
    payment_intent_id: Option<&str>,
    buyer_email: Option<&str>,
) -> Result<bool> {
    let now = now();
    let buyer_email = buyer_email.map(normalize_email);
    let affected = conn.execute(
        "UPDATE orders
         SET status = 'paid',
             payment_intent_id = COALESCE(?1, payment_intent_id),
             buyer_email = COALESCE(buyer_email, ?2),
             paid_at = ?3,
             updated_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![payment_intent_id, buyer_email, now, order_id, from.as_ref()],
    )?;
    Ok(affected > 0)
}

pub fn try_mark_order_expired(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'expired', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
        params![now(), order_id],
    )?;
    Ok(affected > 0)
}

pub fn try_mark_order_refunded(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'refunded', updated_at = ?1 WHERE id = ?2 AND status = 'paid'",
        params![now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Expire a pending order and give its units back, atomically.
/// Returns false if the order was no longer pending.
pub fn release_pending_order(conn: &mut Connection, order_id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    let Some(order) = get_order_by_id(&tx, order_id)? else {
        return Ok(false);
    };
    if !try_mark_order_expired(&tx, order_id)? {
        return Ok(false);
    }
    release_stock(&tx, &order.product_id, order.quantity)?;
    tx.commit()?;
    Ok(true)
}

/// Expire every order still pending since before `cutoff`, releasing stock.
/// Returns the number of orders expired.
pub fn expire_stale_pending_orders(conn: &mut Connection, cutoff: i64) -> Result<usize> {
    let tx = conn.transaction()?;
    let stale: Vec<Order> = query_all(
        &tx,
        &format!(
            "SELECT {} FROM orders WHERE status = 'pending' AND created_at < ?1",
            ORDER_COLS
        ),
        &[&cutoff],
    )?;

    let mut expired = 0;
    for order in &stale {
        if try_mark_order_expired(&tx, &order.id)? {
            release_stock(&tx, &order.product_id, order.quantity)?;
            expired += 1;
        }
    }
    tx.commit()?;
    Ok(expired)
}

// ============ Subscribers ============

/// Subscribe an email to a seller's alerts. Re-subscribing reactivates the
/// existing row and keeps its unsubscribe token.
pub fn upsert_subscriber(
    conn: &Connection,
    seller_id: &str,
    email: &str,
    source_replay_id: Option<&str>,
) -> Result<Subscriber> {
    let email = normalize_email(email);
    conn.query_row(
        &format!(
            "INSERT INTO subscribers (id, seller_id, email, source_replay_id, unsubscribe_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(seller_id, email) DO UPDATE SET unsubscribed_at = NULL
             RETURNING {}",
            SUBSCRIBER_COLS
        ),
        params![gen_id(), seller_id, &email, source_replay_id, generate_token(), now()],
        Subscriber::from_row,
    )
    .map_err(Into::into)
}

/// Mark a subscriber unsubscribed. Idempotent; returns None for an unknown token.
pub fn unsubscribe_by_token(conn: &Connection, token: &str) -> Result<Option<Subscriber>> {
    conn.query_row(
        &format!(
            "UPDATE subscribers SET unsubscribed_at = COALESCE(unsubscribed_at, ?1)
             WHERE unsubscribe_token = ?2
             RETURNING {}",
            SUBSCRIBER_COLS
        ),
        params![now(), token],
        Subscriber::from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub fn list_active_subscribers(conn: &Connection, seller_id: &str) -> Result<Vec<Subscriber>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscribers WHERE seller_id = ?1 AND unsubscribed_at IS NULL ORDER BY created_at, id",
            SUBSCRIBER_COLS
        ),
        &[&seller_id],
    )
}

pub fn list_subscribers_paginated(
    conn: &Connection,
    seller_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Subscriber>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subscribers WHERE seller_id = ?1 AND unsubscribed_at IS NULL",
        params![seller_id],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM subscribers WHERE seller_id = ?1 AND unsubscribed_at IS NULL
             ORDER BY created_at DESC, id LIMIT ?2 OFFSET ?3",
            SUBSCRIBER_COLS
        ),
        &[&seller_id, &limit, &offset],
    )?;
    Ok((items, total))
}

// ============ Webhook Events ============

/// Record a processed webhook event. Returns false if it was already recorded.
/// Call inside the same transaction as the changes the event causes.
pub fn try_record_webhook_event(
    conn: &Connection,
    source: WebhookSource,
    event_id: &str,
    event_type: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (source, event_id, event_type, received_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![source.as_ref(), event_id, event_type, now()],
    )?;
    Ok(affected > 0)
}

pub fn get_webhook_event(
    conn: &Connection,
    source: WebhookSource,
    event_id: &str,
) -> Result<Option<WebhookEventRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE source = ?1 AND event_id = ?2",
            WEBHOOK_EVENT_COLS
        ),
        &[&source.as_ref(), &event_id],
    )
}

/// Purge webhook events beyond the retention period. The provider stops
/// retrying after a few days, so old ids are no longer needed for idempotency.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * 86400;
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE received_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
