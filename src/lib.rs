//! ReplaySell - shoppable storefronts for live-stream replays
//!
//! Sellers turn a replay link into a time-boxed storefront, buyers check out
//! through the seller's connected account, and provider webhooks keep orders,
//! platform subscriptions and connected accounts in sync.

pub mod config;
pub mod crypto;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod oembed;
pub mod pagination;
pub mod payments;
pub mod rate_limit;
pub mod reconcile;
pub mod tasks;
pub mod util;

use axum::Router;

use config::RateLimitConfig;
use db::AppState;

/// Build the full application router.
pub fn app(state: AppState, limits: RateLimitConfig) -> Router {
    Router::new()
        // Storefronts (no auth, rate limited per IP)
        .merge(handlers::public::router(limits))
        // Provider webhooks (signature auth)
        .merge(handlers::webhooks::router())
        // Seller API (bearer API key)
        .merge(handlers::sellers::router(state.clone()))
        .with_state(state)
}
