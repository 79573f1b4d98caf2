//! Test utilities and fixtures for ReplaySell integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::Extension;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;
use tower::ServiceExt;

pub use replaysell::config::RateLimitConfig;
pub use replaysell::db::{AppState, BillingSettings, DbPool, WebhookSecrets, init_db, queries};
pub use replaysell::email::EmailService;
pub use replaysell::error::{AppError, Result, msg};
pub use replaysell::models::*;
pub use replaysell::oembed::OEmbedClient;
pub use replaysell::payments::{
    BillingTarget, CheckoutLink, OrderCheckout, PaymentGateway, SubscriptionCheckout,
};

pub const SNAPSHOT_SECRET: &str = "whsec_test_snapshot";
pub const THIN_SECRET: &str = "whsec_test_thin";
pub const PLATFORM_PRICE: &str = "price_platform_test";
pub const CONNECT_PRICE: &str = "price_connect_test";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn hours_from_now(hours: i64) -> i64 {
    now() + hours * 3600
}

// ============ Fake payment provider ============

/// In-memory stand-in for the payment provider. Records every request.
#[derive(Default)]
pub struct FakeGateway {
    pub fail_order_checkout: AtomicBool,
    pub accounts: Mutex<HashMap<String, AccountSnapshot>>,
    pub order_checkouts: Mutex<Vec<OrderCheckout>>,
    pub subscription_checkouts: Mutex<Vec<SubscriptionCheckout>>,
    pub customers_created: AtomicUsize,
    pub accounts_created: AtomicUsize,
    counter: AtomicUsize,
}

impl FakeGateway {
    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make `retrieve_account` return this state for the account.
    pub fn set_account(&self, account_id: &str, card_payments: CapabilityStatus, requirements_due: bool) {
        self.accounts.lock().unwrap().insert(
            account_id.to_string(),
            AccountSnapshot {
                stripe_account_id: account_id.to_string(),
                card_payments,
                requirements_due,
            },
        );
    }

    pub fn last_order_checkout(&self) -> Option<OrderCheckout> {
        self.order_checkouts.lock().unwrap().last().cloned()
    }

    pub fn last_subscription_checkout(&self) -> Option<SubscriptionCheckout> {
        self.subscription_checkouts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_customer(&self, _email: &str, _name: &str, _seller_id: &str) -> Result<String> {
        self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cus_test_{}", self.next()))
    }

    async fn create_subscription_checkout(&self, req: &SubscriptionCheckout) -> Result<CheckoutLink> {
        self.subscription_checkouts.lock().unwrap().push(req.clone());
        let id = format!("cs_sub_{}", self.next());
        Ok(CheckoutLink {
            url: format!("https://checkout.test/{}", id),
            id,
        })
    }

    async fn create_billing_portal_session(&self, customer_id: &str, _return_url: &str) -> Result<String> {
        Ok(format!("https://billing.test/portal/{}", customer_id))
    }

    async fn create_connected_account(&self, _email: &str, _display_name: &str, _seller_id: &str) -> Result<String> {
        self.accounts_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("acct_test_{}", self.next()))
    }

    async fn create_account_link(&self, account_id: &str, _refresh_url: &str, _return_url: &str) -> Result<String> {
        Ok(format!("https://connect.test/onboard/{}", account_id))
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot> {
        self.accounts
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| AppError::Upstream(format!("No such account: {}", account_id)))
    }

    async fn create_order_checkout(&self, req: &OrderCheckout) -> Result<CheckoutLink> {
        if self.fail_order_checkout.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("Your card was declined".into()));
        }
        self.order_checkouts.lock().unwrap().push(req.clone());
        let id = format!("cs_order_{}", self.next());
        Ok(CheckoutLink {
            url: format!("https://checkout.test/{}", id),
            id,
        })
    }
}

// ============ State and app ============

/// A single-connection in-memory pool. Every pooled connection to
/// `:memory:` is its own database, so the pool must never grow.
pub fn create_test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder()
        .max_size(1)
        .connection_timeout(std::time::Duration::from_secs(5))
        .build(manager)
        .expect("Failed to build test pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).expect("Failed to initialize schema");
    }
    pool
}

pub fn create_test_app_state(gateway: Option<Arc<FakeGateway>>) -> AppState {
    AppState {
        db: create_test_pool(),
        base_url: "http://localhost:3000".to_string(),
        payments: gateway.map(|g| g as Arc<dyn PaymentGateway>),
        webhook_secrets: WebhookSecrets {
            snapshot: vec![SNAPSHOT_SECRET.to_string()],
            thin: Some(THIN_SECRET.to_string()),
        },
        billing: BillingSettings {
            platform_price_id: Some(PLATFORM_PRICE.to_string()),
            connect_price_id: Some(CONNECT_PRICE.to_string()),
            platform_fee_bps: 500,
        },
        email: Arc::new(EmailService::disabled()),
        oembed: Arc::new(OEmbedClient::disabled()),
        default_replay_hours: 72,
    }
}

const UNLIMITED: RateLimitConfig = RateLimitConfig {
    strict_rpm: 10_000,
    standard_rpm: 10_000,
};

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let state = create_test_app_state(Some(gateway.clone()));
        Self::with_state(state, gateway, UNLIMITED)
    }

    /// An app with real per-IP budgets, for exercising the rate limiter.
    pub fn with_limits(limits: RateLimitConfig) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let state = create_test_app_state(Some(gateway.clone()));
        Self::with_state(state, gateway, limits)
    }

    /// An app whose payment provider isn't configured.
    pub fn without_payments() -> Self {
        let state = create_test_app_state(None);
        Self::with_state(state, Arc::new(FakeGateway::default()), UNLIMITED)
    }

    fn with_state(state: AppState, gateway: Arc<FakeGateway>, limits: RateLimitConfig) -> Self {
        // The per-IP limiter reads the peer address the server would insert.
        let router = replaysell::app(state.clone(), limits)
            .layer(Extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))));
        Self {
            state,
            gateway,
            router,
        }
    }

    pub fn conn(&self) -> r2d2::PooledConnection<SqliteConnectionManager> {
        self.state.db.get().expect("Failed to get test connection")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn get(&self, path: &str, api_key: Option<&str>) -> (StatusCode, Value) {
        self.send(request("GET", path, api_key, None)).await
    }

    pub async fn post(&self, path: &str, api_key: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(request("POST", path, api_key, Some(body))).await
    }

    pub async fn put(&self, path: &str, api_key: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(request("PUT", path, api_key, Some(body))).await
    }

    pub async fn delete(&self, path: &str, api_key: Option<&str>) -> (StatusCode, Value) {
        self.send(request("DELETE", path, api_key, None)).await
    }

    /// Deliver a signed webhook.
    pub async fn webhook(&self, path: &str, payload: &Value, secret: &str) -> (StatusCode, Value) {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = sign(&body, secret, now());
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("stripe-signature", signature)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

pub fn request(method: &str, path: &str, api_key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(key) = api_key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Build a `Stripe-Signature` header value for `payload`.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

// ============ Fixtures ============

pub fn create_test_seller(conn: &rusqlite::Connection, email: &str) -> (Seller, String) {
    let input = CreateSeller {
        email: email.to_string(),
        name: format!("Shop {}", email),
    };
    queries::create_seller(conn, &input).expect("Failed to create test seller")
}

pub fn set_subscription(
    conn: &rusqlite::Connection,
    seller_id: &str,
    kind: SubscriptionKind,
    subscription_id: &str,
    status: SubscriptionStatus,
    last_event_at: i64,
) -> Subscription {
    let sub = Subscription {
        seller_id: seller_id.to_string(),
        kind,
        stripe_subscription_id: subscription_id.to_string(),
        status,
        price_id: None,
        current_period_end: None,
        cancel_at_period_end: false,
        last_event_at,
        created_at: last_event_at,
        updated_at: last_event_at,
    };
    queries::save_subscription(conn, &sub).expect("Failed to save subscription");
    sub
}

/// Give the seller an active platform plan.
pub fn activate_platform(conn: &rusqlite::Connection, seller_id: &str) -> Subscription {
    set_subscription(
        conn,
        seller_id,
        SubscriptionKind::Platform,
        &format!("sub_platform_{}", seller_id),
        SubscriptionStatus::Active,
        now(),
    )
}

/// Give the seller a connected account that can take card payments.
pub fn connect_ready(conn: &rusqlite::Connection, seller_id: &str, account_id: &str) -> ConnectedAccount {
    queries::create_connected_account(conn, seller_id, account_id).unwrap();
    queries::apply_account_snapshot(
        conn,
        &AccountSnapshot {
            stripe_account_id: account_id.to_string(),
            card_payments: CapabilityStatus::Active,
            requirements_due: false,
        },
    )
    .unwrap()
    .unwrap()
}

pub fn create_test_replay(
    conn: &rusqlite::Connection,
    seller_id: &str,
    title: &str,
    expires_at: i64,
) -> Replay {
    queries::create_replay(
        conn,
        seller_id,
        &queries::NewReplay {
            title: title.to_string(),
            video_url: "https://www.youtube.com/watch?v=abc123".to_string(),
            platform: Platform::Youtube,
            embed: EmbedMetadata::default(),
            expires_at,
        },
    )
    .expect("Failed to create test replay")
}

pub fn create_test_product(
    conn: &rusqlite::Connection,
    replay: &Replay,
    name: &str,
    price_cents: i64,
    stock: i64,
) -> Product {
    queries::create_product(
        conn,
        replay,
        &CreateProduct {
            name: name.to_string(),
            description: None,
            price_cents,
            currency: None,
            stock,
            image_url: None,
        },
    )
    .expect("Failed to create test product")
}

pub fn create_test_order(conn: &mut rusqlite::Connection, product: &Product, quantity: i64) -> Order {
    queries::create_pending_order(
        conn,
        &CreateOrder {
            seller_id: product.seller_id.clone(),
            replay_id: product.replay_id.clone(),
            product_id: product.id.clone(),
            buyer_email: Some("buyer@example.com".to_string()),
            quantity,
            unit_price_cents: product.price_cents,
            currency: product.currency.clone(),
            connected_account_id: "acct_test".to_string(),
        },
    )
    .expect("Failed to create test order")
}

pub fn product_counts(conn: &rusqlite::Connection, product_id: &str) -> (i64, i64) {
    let p = queries::get_product_including_deleted(conn, product_id)
        .unwrap()
        .expect("product exists");
    (p.stock, p.sold)
}

/// A seller with an active plan, a ready connected account and a live replay
/// with one product. Returns (seller, api key, replay, product).
pub fn storefront_fixture(app: &TestApp, stock: i64) -> (Seller, String, Replay, Product) {
    let conn = app.conn();
    let (seller, api_key) = create_test_seller(&conn, "shop@example.com");
    activate_platform(&conn, &seller.id);
    connect_ready(&conn, &seller.id, "acct_shop");
    let replay = create_test_replay(&conn, &seller.id, "Friday Drop", hours_from_now(24));
    let product = create_test_product(&conn, &replay, "Silk Scarf", 2000, stock);
    (seller, api_key, replay, product)
}
