mod from_row;
pub mod queries;
mod schema;

pub use from_row::FromRow;
pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::email::EmailService;
use crate::error::{AppError, Result, msg};
use crate::oembed::OEmbedClient;
use crate::payments::PaymentGateway;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Webhook signing secrets, one per notification channel.
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    /// Secrets accepted on the snapshot endpoint (billing and Connect destinations).
    pub snapshot: Vec<String>,
    /// Secret of the thin event destination.
    pub thin: Option<String>,
}

/// Prices and fees used when creating checkout sessions.
#[derive(Debug, Clone, Default)]
pub struct BillingSettings {
    pub platform_price_id: Option<String>,
    pub connect_price_id: Option<String>,
    pub platform_fee_bps: u32,
}

impl BillingSettings {
    /// Application fee for a buyer charge, rounded down and never above the total.
    pub fn application_fee(&self, total_cents: i64) -> i64 {
        let fee = i128::from(total_cents) * i128::from(self.platform_fee_bps) / 10_000;
        i64::try_from(fee).map_or(total_cents, |fee| fee.min(total_cents))
    }
}

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public base URL for redirects and links (e.g., https://replaysell.example)
    pub base_url: String,
    /// Payment provider. None when no secret key is configured.
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub webhook_secrets: WebhookSecrets,
    pub billing: BillingSettings,
    pub email: Arc<EmailService>,
    pub oembed: Arc<OEmbedClient>,
    pub default_replay_hours: i64,
}

impl AppState {
    pub fn storefront_url(&self, slug: &str) -> String {
        format!("{}/s/{}", self.base_url, slug)
    }

    pub fn unsubscribe_url(&self, token: &str) -> String {
        format!("{}/unsubscribe/{}", self.base_url, token)
    }

    /// The payment gateway, or a 400 when no provider is configured.
    pub fn payments(&self) -> Result<Arc<dyn PaymentGateway>> {
        self.payments
            .clone()
            .ok_or_else(|| AppError::BadRequest(msg::PAYMENTS_NOT_CONFIGURED.into()))
    }
}

pub fn create_pool(database_path: &str) -> std::result::Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    });
    Pool::builder()
        .max_size(10)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
}
