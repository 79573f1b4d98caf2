use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

/// Most units a buyer can take in one checkout.
pub const MAX_ORDER_QUANTITY: i64 = 10;

/// Order lifecycle.
///
/// `pending → paid → refunded` or `pending → expired`. A checkout completion
/// that arrives after the order was expired moves it `expired → paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub seller_id: String,
    pub replay_id: String,
    pub product_id: String,
    pub buyer_email: Option<String>,
    pub quantity: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub connected_account_id: Option<String>,
    pub paid_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Internal input for creating a pending order with its stock reservation.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub seller_id: String,
    pub replay_id: String,
    pub product_id: String,
    pub buyer_email: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub currency: String,
    pub connected_account_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_quantity() -> i64 {
    1
}

impl CheckoutRequest {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ORDER_QUANTITY).contains(&self.quantity) {
            return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
        }
        if let Some(ref email) = self.email
            && !crate::util::is_valid_email(email)
        {
            return Err(AppError::BadRequest(msg::INVALID_EMAIL.into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilters {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub replay_id: Option<String>,
}
