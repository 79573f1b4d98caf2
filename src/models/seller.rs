use serde::{Deserialize, Serialize};

use super::{ConnectedAccount, Subscription};

use crate::error::{AppError, Result, msg};
use crate::util::is_valid_email;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Visible prefix of the API key (e.g. "rs_1a2b3c4d"), for identification in logs.
    pub api_key_prefix: String,
    /// Platform billing customer at the payment provider.
    pub stripe_customer_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSeller {
    pub email: String,
    pub name: String,
}

impl CreateSeller {
    pub fn validate(&self) -> Result<()> {
        if !is_valid_email(&self.email) {
            return Err(AppError::BadRequest(msg::INVALID_EMAIL.into()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
        }
        Ok(())
    }
}

/// Everything a seller dashboard needs to render billing and payout state.
#[derive(Debug, Clone, Serialize)]
pub struct SellerOverview {
    pub seller: Seller,
    pub platform_subscription: Option<Subscription>,
    pub connected_account: Option<ConnectedAccount>,
    pub connect_subscription: Option<Subscription>,
    pub can_accept_payments: bool,
    pub can_publish: bool,
}
