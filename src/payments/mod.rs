mod stripe;
mod types;

pub use stripe::*;
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AccountSnapshot, SubscriptionKind};

/// Who a subscription checkout bills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingTarget {
    /// A classic platform customer (`cus_...`).
    Customer(String),
    /// A connected account acting as the customer (`acct_...`).
    CustomerAccount(String),
}

#[derive(Debug, Clone)]
pub struct SubscriptionCheckout {
    pub target: BillingTarget,
    pub price_id: String,
    pub seller_id: String,
    pub kind: SubscriptionKind,
    pub success_url: String,
    pub cancel_url: String,
}

/// A buyer checkout, charged directly on the seller's connected account.
#[derive(Debug, Clone)]
pub struct OrderCheckout {
    pub connected_account_id: String,
    pub order_id: String,
    pub product_name: String,
    pub unit_amount: i64,
    pub currency: String,
    pub quantity: i64,
    pub application_fee: i64,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Unix timestamp after which the session can no longer be paid.
    pub expires_at: i64,
}

/// A hosted page the caller should redirect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLink {
    pub id: String,
    pub url: String,
}

/// Operations ReplaySell needs from the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a platform billing customer. Returns the customer id.
    async fn create_customer(&self, email: &str, name: &str, seller_id: &str) -> Result<String>;

    async fn create_subscription_checkout(&self, req: &SubscriptionCheckout) -> Result<CheckoutLink>;

    /// Returns the portal URL.
    async fn create_billing_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String>;

    /// Create a connected account able to take card payments. Returns the account id.
    async fn create_connected_account(&self, email: &str, display_name: &str, seller_id: &str) -> Result<String>;

    /// Returns the onboarding URL.
    async fn create_account_link(&self, account_id: &str, refresh_url: &str, return_url: &str) -> Result<String>;

    /// Fetch the current capability and requirement state of an account.
    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot>;

    async fn create_order_checkout(&self, req: &OrderCheckout) -> Result<CheckoutLink>;
}
