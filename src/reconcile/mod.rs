//! Payment-state reconciliation.
//!
//! Applies provider events to orders, subscriptions and connected accounts.
//! Each event is recorded in `webhook_events` inside the same transaction as
//! the changes it causes, so a failure rolls both back and the retry is
//! processed from scratch.

mod accounts;
mod orders;
mod ordering;
mod subscriptions;

pub use accounts::*;
pub use orders::*;
pub use ordering::should_apply;
pub use subscriptions::*;

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::WebhookSource;

/// Identity of a provider event, used for at-most-once application.
#[derive(Debug, Clone, Copy)]
pub struct EventKey<'a> {
    pub source: WebhookSource,
    pub id: &'a str,
    pub event_type: &'a str,
}

impl<'a> EventKey<'a> {
    pub fn stripe(id: &'a str, event_type: &'a str) -> Self {
        Self {
            source: WebhookSource::Stripe,
            id,
            event_type,
        }
    }

    pub fn thin(id: &'a str, event_type: &'a str) -> Self {
        Self {
            source: WebhookSource::StripeThin,
            id,
            event_type,
        }
    }

    /// Returns false if the event was already recorded.
    fn record(&self, conn: &Connection) -> Result<bool> {
        queries::try_record_webhook_event(conn, self.source, self.id, self.event_type)
    }
}
