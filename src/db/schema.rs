use rusqlite::Connection;

/// Initialize the database schema. Idempotent.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Sellers (API key holders). Only the key hash is stored.
        CREATE TABLE IF NOT EXISTS sellers (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            api_key_prefix TEXT NOT NULL,
            api_key_hash TEXT NOT NULL UNIQUE,
            stripe_customer_id TEXT UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Subscriptions: one platform plan and one connected-account plan per seller.
        -- last_event_at orders out-of-order webhook deliveries.
        CREATE TABLE IF NOT EXISTS subscriptions (
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('platform', 'connect')),
            stripe_subscription_id TEXT NOT NULL,
            status TEXT NOT NULL,
            price_id TEXT,
            current_period_end INTEGER,
            cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
            last_event_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (seller_id, kind)
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_stripe_id ON subscriptions(stripe_subscription_id);

        -- Connected accounts (merchant of record for buyer charges)
        CREATE TABLE IF NOT EXISTS connected_accounts (
            seller_id TEXT PRIMARY KEY REFERENCES sellers(id) ON DELETE CASCADE,
            stripe_account_id TEXT NOT NULL UNIQUE,
            card_payments TEXT NOT NULL DEFAULT 'unrequested',
            requirements_due INTEGER NOT NULL DEFAULT 1,
            synced_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Replays (storefronts bound to a stream replay link)
        CREATE TABLE IF NOT EXISTS replays (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            slug TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            video_url TEXT NOT NULL,
            platform TEXT NOT NULL CHECK (platform IN ('tiktok', 'instagram', 'facebook', 'youtube', 'other')),
            embed_title TEXT,
            author_name TEXT,
            thumbnail_url TEXT,
            expires_at INTEGER NOT NULL,
            archived_at INTEGER,
            alerts_sent_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_replays_seller ON replays(seller_id, created_at);

        -- Products listed on a replay
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            replay_id TEXT NOT NULL REFERENCES replays(id) ON DELETE CASCADE,
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            price_cents INTEGER NOT NULL CHECK (price_cents > 0),
            currency TEXT NOT NULL,
            stock INTEGER NOT NULL CHECK (stock >= 0),
            sold INTEGER NOT NULL DEFAULT 0 CHECK (sold >= 0),
            image_url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_products_replay ON products(replay_id) WHERE deleted_at IS NULL;

        -- Buyer orders. Stock is reserved while pending.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            replay_id TEXT NOT NULL REFERENCES replays(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            buyer_email TEXT,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            total_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'paid', 'expired', 'refunded')),
            checkout_session_id TEXT UNIQUE,
            payment_intent_id TEXT,
            connected_account_id TEXT,
            paid_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_seller ON orders(seller_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_orders_pending ON orders(created_at) WHERE status = 'pending';
        CREATE INDEX IF NOT EXISTS idx_orders_payment_intent ON orders(payment_intent_id);

        -- Alert subscribers (per seller)
        CREATE TABLE IF NOT EXISTS subscribers (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            email TEXT NOT NULL,
            source_replay_id TEXT REFERENCES replays(id) ON DELETE SET NULL,
            unsubscribe_token TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            unsubscribed_at INTEGER,
            UNIQUE (seller_id, email)
        );

        -- Processed webhook events (idempotency; purged after retention)
        CREATE TABLE IF NOT EXISTS webhook_events (
            source TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            received_at INTEGER NOT NULL,
            PRIMARY KEY (source, event_id)
        );
        "#,
    )
}
