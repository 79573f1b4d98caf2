use serde::Serialize;
use strum::{AsRefStr, EnumString};

/// Notification channel an event arrived on. Event ids are unique per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum WebhookSource {
    /// Snapshot events: checkout, subscriptions, invoices, charges.
    Stripe,
    /// Thin events: v2 account changes, no payload state.
    StripeThin,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventRecord {
    pub source: String,
    pub event_id: String,
    pub event_type: String,
    pub received_at: i64,
}
