mod account;
mod orders;
mod products;
mod replays;

pub use account::*;
pub use orders::*;
pub use products::*;
pub use replays::*;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use serde::Serialize;

use crate::db::AppState;
use crate::middleware::seller_auth;

/// A hosted page to redirect the seller to.
#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        // Replays
        .route("/replays", post(create_replay).get(list_replays))
        .route("/replays/preview", get(preview_replay))
        .route("/replays/{id}", get(get_replay).put(update_replay))
        .route("/replays/{id}/archive", post(archive_replay))
        .route("/replays/{id}/alerts", post(send_replay_alerts))
        // Products
        .route("/replays/{id}/products", post(create_product).get(list_products))
        .route("/products/{id}", put(update_product).delete(delete_product))
        // Orders and audience
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/subscribers", get(list_subscribers))
        // Platform billing
        .route("/billing/checkout", post(create_billing_checkout))
        .route("/billing/portal", post(create_billing_portal))
        // Connected account
        .route("/connect/onboard", post(onboard_connected_account))
        .route("/connect/refresh", post(refresh_connected_account))
        .route("/connect/subscription", post(create_connect_subscription_checkout))
        .layer(middleware::from_fn_with_state(state, seller_auth))
}
