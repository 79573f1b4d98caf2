use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Which billing relationship a subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionKind {
    /// The seller's own ReplaySell plan, billed to their platform customer.
    Platform,
    /// The plan billed to the seller's connected account (customer_account).
    Connect,
}

/// Subscription lifecycle as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Terminal statuses can't transition back to a live state for the same
    /// subscription id. A new subscription is created instead.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::IncompleteExpired)
    }

    /// Whether this status grants access to paid features.
    pub fn is_entitled(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub seller_id: String,
    pub kind: SubscriptionKind,
    pub stripe_subscription_id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    /// Provider timestamp of the event that produced this state.
    pub last_event_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    pub fn is_entitled(&self) -> bool {
        self.status.is_entitled()
    }
}

/// An observed change to a subscription, normalized from any provider event.
#[derive(Debug, Clone)]
pub struct SubscriptionChange {
    pub stripe_subscription_id: String,
    /// `None` keeps the current status (e.g. a zero-amount invoice during a trial).
    pub status: Option<SubscriptionStatus>,
    pub price_id: Option<String>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: Option<bool>,
    pub event_at: i64,
}
