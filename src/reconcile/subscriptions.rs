use std::collections::HashMap;

use rusqlite::Connection;

use super::{EventKey, should_apply};
use crate::db::queries;
use crate::error::Result;
use crate::models::{Subscription, SubscriptionChange, SubscriptionKind, SubscriptionStatus};
use crate::util::now;

/// Event time stored for a subscription known only from its checkout.
const PLACEHOLDER_EVENT_AT: i64 = 0;

/// The seller relationship a subscription event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTarget {
    pub seller_id: String,
    pub kind: SubscriptionKind,
}

/// Result of applying a subscription-related event.
#[derive(Debug)]
pub enum SubscriptionOutcome {
    Applied(Subscription),
    /// Older than (or superseded by) the stored state.
    Stale,
    Duplicate,
}

/// Identifiers a subscription event can be traced back to a seller with.
#[derive(Debug, Default)]
pub struct SubscriptionRefs<'a> {
    pub metadata: Option<&'a HashMap<String, String>>,
    pub customer_account: Option<&'a str>,
    pub customer: Option<&'a str>,
    pub subscription_id: Option<&'a str>,
}

/// Find which seller and plan an event is about.
///
/// Tries checkout metadata first, then the connected account acting as the
/// customer, then the platform customer, then an already-known subscription id.
pub fn resolve_target(conn: &Connection, refs: &SubscriptionRefs) -> Result<Option<SubscriptionTarget>> {
    if let Some(metadata) = refs.metadata
        && let (Some(seller_id), Some(kind)) = (metadata.get("seller_id"), metadata.get("kind"))
        && let Ok(kind) = kind.parse::<SubscriptionKind>()
        && queries::get_seller_by_id(conn, seller_id)?.is_some()
    {
        return Ok(Some(SubscriptionTarget {
            seller_id: seller_id.clone(),
            kind,
        }));
    }

    if let Some(account_id) = refs.customer_account
        && let Some(account) = queries::get_connected_account_by_stripe_id(conn, account_id)?
    {
        return Ok(Some(SubscriptionTarget {
            seller_id: account.seller_id,
            kind: SubscriptionKind::Connect,
        }));
    }

    if let Some(customer_id) = refs.customer
        && let Some(seller) = queries::get_seller_by_stripe_customer(conn, customer_id)?
    {
        return Ok(Some(SubscriptionTarget {
            seller_id: seller.id,
            kind: SubscriptionKind::Platform,
        }));
    }

    if let Some(subscription_id) = refs.subscription_id
        && let Some(sub) = queries::get_subscription_by_stripe_id(conn, subscription_id)?
    {
        return Ok(Some(SubscriptionTarget {
            seller_id: sub.seller_id,
            kind: sub.kind,
        }));
    }

    Ok(None)
}

/// Build the row that results from applying `change` on top of `existing`.
///
/// Only a change that sets a status moves `last_event_at`. Status-less changes
/// (checkout completion, zero-amount invoices) must not make a real status
/// event generated earlier look stale.
fn merge(
    target: &SubscriptionTarget,
    existing: Option<&Subscription>,
    change: &SubscriptionChange,
    at: i64,
) -> Subscription {
    match existing {
        Some(cur) if cur.stripe_subscription_id == change.stripe_subscription_id => Subscription {
            seller_id: cur.seller_id.clone(),
            kind: cur.kind,
            stripe_subscription_id: cur.stripe_subscription_id.clone(),
            status: change.status.unwrap_or(cur.status),
            price_id: change.price_id.clone().or_else(|| cur.price_id.clone()),
            current_period_end: change.current_period_end.or(cur.current_period_end),
            cancel_at_period_end: change.cancel_at_period_end.unwrap_or(cur.cancel_at_period_end),
            last_event_at: match change.status {
                Some(_) => change.event_at.max(cur.last_event_at),
                None => cur.last_event_at,
            },
            created_at: cur.created_at,
            updated_at: at,
        },
        _ => Subscription {
            seller_id: target.seller_id.clone(),
            kind: target.kind,
            stripe_subscription_id: change.stripe_subscription_id.clone(),
            status: change.status.unwrap_or(SubscriptionStatus::Incomplete),
            price_id: change.price_id.clone(),
            current_period_end: change.current_period_end,
            cancel_at_period_end: change.cancel_at_period_end.unwrap_or(false),
            last_event_at: change.event_at,
            created_at: existing.map(|e| e.created_at).unwrap_or(at),
            updated_at: at,
        },
    }
}

/// Apply a change within an open transaction, subject to the ordering rule.
fn apply_locked(
    conn: &Connection,
    target: &SubscriptionTarget,
    change: &SubscriptionChange,
) -> Result<SubscriptionOutcome> {
    let existing = queries::get_subscription(conn, &target.seller_id, target.kind)?;
    if !should_apply(existing.as_ref(), change) {
        tracing::info!(
            seller_id = %target.seller_id,
            kind = target.kind.as_ref(),
            subscription_id = %change.stripe_subscription_id,
            event_at = change.event_at,
            "Skipping stale subscription change"
        );
        return Ok(SubscriptionOutcome::Stale);
    }

    let updated = merge(target, existing.as_ref(), change, now());
    queries::save_subscription(conn, &updated)?;
    tracing::info!(
        seller_id = %updated.seller_id,
        kind = updated.kind.as_ref(),
        subscription_id = %updated.stripe_subscription_id,
        status = updated.status.as_ref(),
        "Subscription updated"
    );
    Ok(SubscriptionOutcome::Applied(updated))
}

/// Apply a subscription or invoice event.
pub fn apply_subscription_change(
    conn: &mut Connection,
    event: EventKey,
    target: &SubscriptionTarget,
    change: &SubscriptionChange,
) -> Result<SubscriptionOutcome> {
    let tx = conn.transaction()?;
    if !event.record(&tx)? {
        return Ok(SubscriptionOutcome::Duplicate);
    }
    let outcome = apply_locked(&tx, target, change)?;
    tx.commit()?;
    Ok(outcome)
}

/// Apply a completed subscription checkout.
///
/// Links the platform customer to the seller if it isn't yet. An unknown
/// subscription is recorded as `incomplete` with the ordering floor as its
/// event time, so any subscription event carrying a real status replaces it.
/// An already-known subscription is left as it is.
pub fn complete_subscription_checkout(
    conn: &mut Connection,
    event: EventKey,
    target: &SubscriptionTarget,
    subscription_id: &str,
    customer_id: Option<&str>,
    event_at: i64,
) -> Result<SubscriptionOutcome> {
    let tx = conn.transaction()?;
    if !event.record(&tx)? {
        return Ok(SubscriptionOutcome::Duplicate);
    }

    if target.kind == SubscriptionKind::Platform
        && let Some(customer_id) = customer_id
        && queries::set_seller_stripe_customer(&tx, &target.seller_id, customer_id)?
    {
        tracing::info!(seller_id = %target.seller_id, customer_id, "Linked billing customer");
    }

    let existing = queries::get_subscription(&tx, &target.seller_id, target.kind)?;
    let outcome = match existing {
        Some(cur) if cur.stripe_subscription_id == subscription_id => SubscriptionOutcome::Applied(cur),
        existing => {
            let change = SubscriptionChange {
                stripe_subscription_id: subscription_id.to_string(),
                status: Some(SubscriptionStatus::Incomplete),
                price_id: None,
                current_period_end: None,
                cancel_at_period_end: None,
                event_at,
            };
            if should_apply(existing.as_ref(), &change) {
                let mut placeholder = merge(target, existing.as_ref(), &change, now());
                placeholder.last_event_at = PLACEHOLDER_EVENT_AT;
                queries::save_subscription(&tx, &placeholder)?;
                tracing::info!(
                    seller_id = %target.seller_id,
                    kind = target.kind.as_ref(),
                    subscription_id,
                    "Subscription checkout recorded"
                );
                SubscriptionOutcome::Applied(placeholder)
            } else {
                SubscriptionOutcome::Stale
            }
        }
    };
    tx.commit()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_fields_the_change_does_not_carry() {
        let target = SubscriptionTarget {
            seller_id: "s1".into(),
            kind: SubscriptionKind::Platform,
        };
        let cur = Subscription {
            seller_id: "s1".into(),
            kind: SubscriptionKind::Platform,
            stripe_subscription_id: "sub_1".into(),
            status: SubscriptionStatus::Active,
            price_id: Some("price_1".into()),
            current_period_end: Some(1000),
            cancel_at_period_end: true,
            last_event_at: 50,
            created_at: 10,
            updated_at: 10,
        };
        let change = SubscriptionChange {
            stripe_subscription_id: "sub_1".into(),
            status: Some(SubscriptionStatus::PastDue),
            price_id: None,
            current_period_end: None,
            cancel_at_period_end: None,
            event_at: 60,
        };

        let merged = merge(&target, Some(&cur), &change, 99);
        assert_eq!(merged.status, SubscriptionStatus::PastDue);
        assert_eq!(merged.price_id.as_deref(), Some("price_1"));
        assert_eq!(merged.current_period_end, Some(1000));
        assert!(merged.cancel_at_period_end);
        assert_eq!(merged.last_event_at, 60);
        assert_eq!(merged.created_at, 10);
    }

    #[test]
    fn merge_without_status_keeps_event_time() {
        let target = SubscriptionTarget {
            seller_id: "s1".into(),
            kind: SubscriptionKind::Platform,
        };
        let cur = Subscription {
            seller_id: "s1".into(),
            kind: SubscriptionKind::Platform,
            stripe_subscription_id: "sub_1".into(),
            status: SubscriptionStatus::Trialing,
            price_id: None,
            current_period_end: Some(1000),
            cancel_at_period_end: false,
            last_event_at: 50,
            created_at: 10,
            updated_at: 10,
        };
        let change = SubscriptionChange {
            stripe_subscription_id: "sub_1".into(),
            status: None,
            price_id: None,
            current_period_end: Some(2000),
            cancel_at_period_end: None,
            event_at: 80,
        };

        let merged = merge(&target, Some(&cur), &change, 99);
        assert_eq!(merged.status, SubscriptionStatus::Trialing);
        assert_eq!(merged.current_period_end, Some(2000));
        assert_eq!(merged.last_event_at, 50);
    }

    #[test]
    fn merge_replaces_row_for_a_new_subscription() {
        let target = SubscriptionTarget {
            seller_id: "s1".into(),
            kind: SubscriptionKind::Connect,
        };
        let cur = Subscription {
            seller_id: "s1".into(),
            kind: SubscriptionKind::Connect,
            stripe_subscription_id: "sub_old".into(),
            status: SubscriptionStatus::Canceled,
            price_id: Some("price_old".into()),
            current_period_end: Some(1000),
            cancel_at_period_end: true,
            last_event_at: 500,
            created_at: 10,
            updated_at: 10,
        };
        let change = SubscriptionChange {
            stripe_subscription_id: "sub_new".into(),
            status: Some(SubscriptionStatus::Active),
            price_id: Some("price_new".into()),
            current_period_end: Some(2000),
            cancel_at_period_end: None,
            event_at: 100,
        };

        let merged = merge(&target, Some(&cur), &change, 99);
        assert_eq!(merged.stripe_subscription_id, "sub_new");
        assert_eq!(merged.price_id.as_deref(), Some("price_new"));
        assert!(!merged.cancel_at_period_end);
        assert_eq!(merged.last_event_at, 100);
        assert_eq!(merged.created_at, 10);
    }
}
