//! Per-IP rate limiting for public storefront endpoints.
//!
//! - Strict: checkout and subscribe (write paths, checkout calls the provider)
//! - Standard: storefront reads and unsubscribe
//!
//! Configured with RATE_LIMIT_STRICT_RPM (default 10) and
//! RATE_LIMIT_STANDARD_RPM (default 60).

use std::sync::Arc;
use std::time::Duration;

use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

use crate::config::RateLimitConfig;

pub type RateLimitLayer = GovernorLayer<
    PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Milliseconds between replenished requests for a per-minute budget.
fn replenish_interval(requests_per_minute: u32) -> Duration {
    let rpm = u64::from(requests_per_minute.max(1));
    Duration::from_millis((60_000 / rpm).max(1))
}

fn create_layer(requests_per_minute: u32) -> RateLimitLayer {
    // Built once at startup; period and burst are never zero.
    let config = GovernorConfigBuilder::default()
        .period(replenish_interval(requests_per_minute))
        .burst_size(requests_per_minute.max(1))
        .finish()
        .expect("Failed to build rate limiter config");
    GovernorLayer::new(Arc::new(config))
}

pub fn strict_layer(limits: &RateLimitConfig) -> RateLimitLayer {
    create_layer(limits.strict_rpm)
}

pub fn standard_layer(limits: &RateLimitConfig) -> RateLimitLayer {
    create_layer(limits.standard_rpm)
}
