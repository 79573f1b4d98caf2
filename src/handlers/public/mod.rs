mod checkout;
mod storefront;
mod subscribers;

pub use checkout::*;
pub use storefront::*;
pub use subscribers::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(limits: RateLimitConfig) -> Router<AppState> {
    // Writes: checkout reaches the payment provider, subscribe stores emails
    let strict = Router::new()
        .route("/s/{slug}/checkout", post(create_checkout))
        .route("/s/{slug}/subscribe", post(subscribe))
        .layer(rate_limit::strict_layer(&limits));

    let standard = Router::new()
        .route("/s/{slug}", get(get_storefront))
        .route("/unsubscribe/{token}", get(unsubscribe))
        .layer(rate_limit::standard_layer(&limits));

    Router::new()
        .route("/health", get(health))
        .merge(strict)
        .merge(standard)
}
