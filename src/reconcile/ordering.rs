//! Ordering rule for subscription state.
//!
//! Webhook deliveries arrive out of order and are retried, so every change
//! carries the provider's event timestamp and is compared with the timestamp
//! of the state it would replace.

use crate::models::{Subscription, SubscriptionChange};

/// Whether `incoming` should replace the stored subscription state.
///
/// - No stored row: apply, unless the change has no status to set.
/// - Same subscription: never go back in time, and a terminal status can
///   only be replaced by a newer terminal status.
/// - Different subscription: replace a terminal one freely; otherwise only a
///   newer, non-terminal subscription takes over. A late terminal event for an
///   old subscription never clobbers the current one.
pub fn should_apply(existing: Option<&Subscription>, incoming: &SubscriptionChange) -> bool {
    let Some(current) = existing else {
        return incoming.status.is_some();
    };

    if current.stripe_subscription_id == incoming.stripe_subscription_id {
        if incoming.event_at < current.last_event_at {
            return false;
        }
        if current.status.is_terminal() {
            return incoming.status.is_some_and(|s| s.is_terminal())
                && incoming.event_at > current.last_event_at;
        }
        return true;
    }

    let Some(status) = incoming.status else {
        return false;
    };
    if current.status.is_terminal() {
        return true;
    }
    !status.is_terminal() && incoming.event_at >= current.last_event_at
}
