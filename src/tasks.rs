//! Background maintenance.

use std::time::Duration;

use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::util::now;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub pending_order_ttl_minutes: i64,
    pub webhook_event_retention_days: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub orders_expired: usize,
    pub webhook_events_purged: usize,
}

/// Expire abandoned pending orders (releasing their stock) and purge old
/// webhook event ids. A checkout that completes after its order was expired
/// here is still honoured by reconciliation.
pub fn sweep(db: &DbPool, settings: SweepSettings) -> Result<SweepReport> {
    let mut conn = db.get()?;
    let cutoff = now() - settings.pending_order_ttl_minutes * 60;
    let orders_expired = queries::expire_stale_pending_orders(&mut conn, cutoff)?;

    let webhook_events_purged = if settings.webhook_event_retention_days > 0 {
        queries::purge_old_webhook_events(&conn, settings.webhook_event_retention_days)?
    } else {
        0
    };

    Ok(SweepReport {
        orders_expired,
        webhook_events_purged,
    })
}

pub fn spawn_sweeper(db: DbPool, settings: SweepSettings) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SWEEP_INTERVAL).await;

            let db = db.clone();
            match tokio::task::spawn_blocking(move || sweep(&db, settings)).await {
                Ok(Ok(report)) => {
                    if report != SweepReport::default() {
                        tracing::info!(
                            orders_expired = report.orders_expired,
                            webhook_events_purged = report.webhook_events_purged,
                            "Sweep completed"
                        );
                    }
                }
                Ok(Err(e)) => tracing::warn!("Sweep failed: {}", e),
                Err(e) => tracing::error!("Sweep task panicked: {}", e),
            }
        }
    });

    tracing::info!("Background sweeper started (runs every 5 minutes)");
}
