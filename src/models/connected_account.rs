use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Status of a capability on a connected account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CapabilityStatus {
    Active,
    Pending,
    Restricted,
    Unsupported,
    #[default]
    Unrequested,
}

/// The seller's merchant-of-record account at the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub seller_id: String,
    pub stripe_account_id: String,
    pub card_payments: CapabilityStatus,
    /// Outstanding onboarding requirements (currently or past due).
    pub requirements_due: bool,
    /// Last time the state was fetched from the provider.
    pub synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConnectedAccount {
    pub fn can_accept_payments(&self) -> bool {
        self.card_payments == CapabilityStatus::Active && !self.requirements_due
    }
}

/// Current account state as fetched from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub stripe_account_id: String,
    pub card_payments: CapabilityStatus,
    pub requirements_due: bool,
}
