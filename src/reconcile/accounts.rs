use super::EventKey;
use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::models::ConnectedAccount;
use crate::payments::PaymentGateway;

/// Result of syncing a connected account from the provider.
#[derive(Debug)]
pub enum AccountOutcome {
    Synced(ConnectedAccount),
    /// The account doesn't belong to any seller.
    Unknown,
    Duplicate,
}

/// Fetch the account's current state and store it.
///
/// Used by the seller's refresh action and the return from onboarding. The
/// fetched state is always the latest, so no ordering check is needed.
pub async fn sync_connected_account(
    db: &DbPool,
    gateway: &dyn PaymentGateway,
    stripe_account_id: &str,
) -> Result<AccountOutcome> {
    {
        let conn = db.get()?;
        if queries::get_connected_account_by_stripe_id(&conn, stripe_account_id)?.is_none() {
            return Ok(AccountOutcome::Unknown);
        }
    }

    let snapshot = gateway.retrieve_account(stripe_account_id).await?;

    let conn = db.get()?;
    Ok(match queries::apply_account_snapshot(&conn, &snapshot)? {
        Some(account) => {
            tracing::info!(
                seller_id = %account.seller_id,
                account_id = %account.stripe_account_id,
                card_payments = account.card_payments.as_ref(),
                requirements_due = account.requirements_due,
                "Connected account synced"
            );
            AccountOutcome::Synced(account)
        }
        None => AccountOutcome::Unknown,
    })
}

/// Apply a thin account event: the notification carries only the account id,
/// so the state is fetched before the event is recorded.
pub async fn apply_thin_account_event(
    db: &DbPool,
    gateway: &dyn PaymentGateway,
    event: EventKey<'_>,
    stripe_account_id: &str,
) -> Result<AccountOutcome> {
    {
        let conn = db.get()?;
        if queries::get_webhook_event(&conn, event.source, event.id)?.is_some() {
            return Ok(AccountOutcome::Duplicate);
        }
        if queries::get_connected_account_by_stripe_id(&conn, stripe_account_id)?.is_none() {
            return Ok(AccountOutcome::Unknown);
        }
    }

    // No connection is held across the provider call.
    let snapshot = gateway.retrieve_account(stripe_account_id).await?;

    let mut conn = db.get()?;
    let tx = conn.transaction()?;
    if !event.record(&tx)? {
        return Ok(AccountOutcome::Duplicate);
    }
    let outcome = match queries::apply_account_snapshot(&tx, &snapshot)? {
        Some(account) => {
            tracing::info!(
                seller_id = %account.seller_id,
                account_id = %account.stripe_account_id,
                card_payments = account.card_payments.as_ref(),
                requirements_due = account.requirements_due,
                event_type = event.event_type,
                "Connected account updated from thin event"
            );
            AccountOutcome::Synced(account)
        }
        None => AccountOutcome::Unknown,
    };
    tx.commit()?;
    Ok(outcome)
}
