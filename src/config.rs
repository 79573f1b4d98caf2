use std::env;

/// Rate limits (requests per minute, per IP) for public endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 60,
        }
    }
}

/// Stripe credentials and prices. Everything is optional so the server can
/// run (storefronts, replays) without a payment account in development.
#[derive(Debug, Clone, Default)]
pub struct StripeSettings {
    pub secret_key: Option<String>,
    /// Override of the API host, for stripe-mock.
    pub api_base: Option<String>,
    /// Signing secret of the snapshot (billing) endpoint.
    pub webhook_secret: Option<String>,
    /// Signing secret of the Connect endpoint (direct charges on connected accounts).
    /// Delivered to the same URL, so either secret is accepted there.
    pub connect_webhook_secret: Option<String>,
    /// Signing secret of the thin event destination (v2 account events).
    pub thin_webhook_secret: Option<String>,
    pub platform_price_id: Option<String>,
    pub connect_price_id: Option<String>,
    /// Application fee charged on buyer payments, in basis points.
    pub platform_fee_bps: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    pub stripe: StripeSettings,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub default_replay_hours: i64,
    pub pending_order_ttl_minutes: i64,
    pub webhook_event_retention_days: i64,
    pub rate_limit: RateLimitConfig,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("REPLAYSELL_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_or("PORT", 3000);

        let base_url = env::var("BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            strict_rpm: parse_or("RATE_LIMIT_STRICT_RPM", defaults.strict_rpm).max(1),
            standard_rpm: parse_or("RATE_LIMIT_STANDARD_RPM", defaults.standard_rpm).max(1),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "replaysell.db".to_string()),
            base_url,
            dev_mode,
            stripe: StripeSettings {
                secret_key: non_empty("STRIPE_SECRET_KEY"),
                api_base: non_empty("STRIPE_API_BASE"),
                webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET"),
                connect_webhook_secret: non_empty("STRIPE_CONNECT_WEBHOOK_SECRET"),
                thin_webhook_secret: non_empty("STRIPE_THIN_WEBHOOK_SECRET"),
                platform_price_id: non_empty("STRIPE_PLATFORM_PRICE_ID"),
                connect_price_id: non_empty("STRIPE_CONNECT_PRICE_ID"),
                platform_fee_bps: parse_or("PLATFORM_FEE_BPS", 500u32).min(10_000),
            },
            resend_api_key: non_empty("RESEND_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "ReplaySell <noreply@replaysell.local>".to_string()),
            default_replay_hours: parse_or("DEFAULT_REPLAY_HOURS", 72i64).clamp(1, 720),
            pending_order_ttl_minutes: parse_or("PENDING_ORDER_TTL_MINUTES", 90i64).max(31),
            webhook_event_retention_days: parse_or("WEBHOOK_EVENT_RETENTION_DAYS", 30i64),
            rate_limit,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
