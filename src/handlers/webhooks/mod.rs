mod common;
mod stripe;
mod thin;

pub use common::WebhookResult;
pub use stripe::handle_stripe_webhook;
pub use thin::handle_stripe_thin_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/stripe", post(handle_stripe_webhook))
        .route("/webhooks/stripe/thin", post(handle_stripe_thin_webhook))
}
