//! Stripe payload types. Only the fields ReplaySell reads are modeled.

use std::collections::HashMap;

use serde::Deserialize;

use crate::models::{AccountSnapshot, CapabilityStatus};

/// Snapshot event envelope - `data.object` is parsed based on `event_type`.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp the event was created at. Used to order deliveries.
    pub created: i64,
    /// Set when the event happened on a connected account.
    #[serde(default)]
    pub account: Option<String>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session.* ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>, // "payment" or "subscription"
    #[serde(default)]
    pub payment_status: Option<String>,
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_account: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<StripeCustomerDetails>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

impl StripeCheckoutSession {
    /// Email the buyer entered on the checkout page, falling back to the prefilled one.
    pub fn buyer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }
}

// ============ customer.subscription.* ============

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_account: Option<String>,
    pub status: String, // "active", "canceled", etc.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Present on older API versions; newer ones report it per item.
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeSubscription {
    pub fn price_id(&self) -> Option<String> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|p| p.id.clone())
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .iter()
                .filter_map(|item| item.current_period_end)
                .max()
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub price: Option<StripePrice>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

// ============ invoice.* ============

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_account: Option<String>,
    /// Older API versions put the subscription at the top level.
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub parent: Option<StripeInvoiceParent>,
    pub status: Option<String>, // "paid", "open", etc.
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub lines: StripeList<StripeInvoiceLine>,
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoiceParent {
    pub subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionDetails {
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoiceLine {
    pub period: Option<StripePeriod>,
}

#[derive(Debug, Deserialize)]
pub struct StripePeriod {
    pub end: i64,
}

impl StripeInvoice {
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_deref().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.subscription_details.as_ref())
                .and_then(|d| d.subscription.as_deref())
        })
    }

    pub fn subscription_metadata(&self) -> Option<&HashMap<String, String>> {
        self.parent
            .as_ref()
            .and_then(|p| p.subscription_details.as_ref())
            .map(|d| &d.metadata)
    }

    /// End of the latest billed period across all lines.
    pub fn period_end(&self) -> Option<i64> {
        self.lines
            .data
            .iter()
            .filter_map(|line| line.period.as_ref().map(|p| p.end))
            .max()
    }
}

// ============ charge.refunded ============

#[derive(Debug, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
}

impl StripeCharge {
    pub fn is_fully_refunded(&self) -> bool {
        self.refunded || (self.amount > 0 && self.amount_refunded >= self.amount)
    }
}

// ============ Thin events (v2) ============

/// Thin event notification. Carries ids only; state must be fetched.
#[derive(Debug, Deserialize)]
pub struct StripeThinEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub related_object: Option<StripeRelatedObject>,
}

#[derive(Debug, Deserialize)]
pub struct StripeRelatedObject {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub url: Option<String>,
}

// ============ v2 accounts ============

#[derive(Debug, Deserialize)]
pub struct StripeV2Account {
    pub id: String,
    #[serde(default)]
    pub configuration: Option<StripeAccountConfiguration>,
    #[serde(default)]
    pub requirements: Option<StripeAccountRequirements>,
}

#[derive(Debug, Deserialize)]
pub struct StripeAccountConfiguration {
    pub merchant: Option<StripeMerchantConfiguration>,
}

#[derive(Debug, Deserialize)]
pub struct StripeMerchantConfiguration {
    pub capabilities: Option<StripeMerchantCapabilities>,
}

#[derive(Debug, Deserialize)]
pub struct StripeMerchantCapabilities {
    pub card_payments: Option<StripeCapability>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCapability {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeAccountRequirements {
    pub summary: Option<StripeRequirementsSummary>,
}

#[derive(Debug, Deserialize)]
pub struct StripeRequirementsSummary {
    pub minimum_deadline: Option<StripeDeadline>,
}

#[derive(Debug, Deserialize)]
pub struct StripeDeadline {
    pub status: String, // "currently_due", "past_due", "eventually_due"
}

impl StripeV2Account {
    pub fn to_snapshot(&self) -> AccountSnapshot {
        let card_payments = self
            .configuration
            .as_ref()
            .and_then(|c| c.merchant.as_ref())
            .and_then(|m| m.capabilities.as_ref())
            .and_then(|c| c.card_payments.as_ref())
            .map(|c| c.status.parse().unwrap_or(CapabilityStatus::Pending))
            .unwrap_or_default();

        let requirements_due = self
            .requirements
            .as_ref()
            .and_then(|r| r.summary.as_ref())
            .and_then(|s| s.minimum_deadline.as_ref())
            .is_some_and(|d| matches!(d.status.as_str(), "currently_due" | "past_due"));

        AccountSnapshot {
            stripe_account_id: self.id.clone(),
            card_payments,
            requirements_due,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_account_snapshot_reads_nested_capability() {
        let account: StripeV2Account = serde_json::from_value(serde_json::json!({
            "id": "acct_123",
            "configuration": {
                "merchant": { "capabilities": { "card_payments": { "status": "active" } } }
            },
            "requirements": { "summary": { "minimum_deadline": null } }
        }))
        .unwrap();

        let snapshot = account.to_snapshot();
        assert_eq!(snapshot.card_payments, CapabilityStatus::Active);
        assert!(!snapshot.requirements_due);
    }

    #[test]
    fn v2_account_without_configuration_is_unrequested() {
        let account: StripeV2Account = serde_json::from_value(serde_json::json!({
            "id": "acct_123",
            "requirements": { "summary": { "minimum_deadline": { "status": "past_due" } } }
        }))
        .unwrap();

        let snapshot = account.to_snapshot();
        assert_eq!(snapshot.card_payments, CapabilityStatus::Unrequested);
        assert!(snapshot.requirements_due);
    }

    #[test]
    fn invoice_subscription_from_parent_details() {
        let invoice: StripeInvoice = serde_json::from_value(serde_json::json!({
            "id": "in_1",
            "customer": "cus_1",
            "status": "paid",
            "parent": { "subscription_details": { "subscription": "sub_1", "metadata": {} } },
            "lines": { "data": [ { "period": { "end": 100 } }, { "period": { "end": 200 } } ] }
        }))
        .unwrap();

        assert_eq!(invoice.subscription_id(), Some("sub_1"));
        assert_eq!(invoice.period_end(), Some(200));
    }

    #[test]
    fn partial_refund_is_not_full() {
        let charge = StripeCharge {
            id: "ch_1".into(),
            payment_intent: Some("pi_1".into()),
            refunded: false,
            amount: 1000,
            amount_refunded: 400,
        };
        assert!(!charge.is_fully_refunded());
    }
}
