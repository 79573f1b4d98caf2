use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result, msg};

/// Deserialize a double Option field where:
/// - Field absent in JSON → None (don't update)
/// - Field present with null → Some(None) (set to NULL in DB)
/// - Field present with value → Some(Some(value)) (set to value)
fn deserialize_optional_nullable<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(Some(value))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub replay_id: String,
    pub seller_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    /// Lowercase ISO 4217 code (e.g. "usd")
    pub currency: String,
    /// Units still available for checkout (pending orders hold their units).
    pub stock: i64,
    /// Units in paid orders.
    pub sold: i64,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

/// Largest single charge the payment provider accepts, in minor units.
pub const MAX_PRICE_CENTS: i64 = 99_999_999;

fn validate_price(price_cents: i64) -> Result<()> {
    if !(1..=MAX_PRICE_CENTS).contains(&price_cents) {
        return Err(AppError::BadRequest(msg::INVALID_PRICE.into()));
    }
    Ok(())
}

fn validate_currency(currency: &str) -> Result<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(msg::INVALID_CURRENCY.into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub stock: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CreateProduct {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
        }
        validate_price(self.price_cents)?;
        if self.stock < 0 {
            return Err(AppError::BadRequest(msg::INVALID_STOCK.into()));
        }
        if let Some(ref currency) = self.currency {
            validate_currency(currency)?;
        }
        Ok(())
    }

    pub fn currency_or_default(&self) -> String {
        self.currency
            .as_deref()
            .unwrap_or("usd")
            .to_ascii_lowercase()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub description: Option<Option<String>>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub stock: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub image_url: Option<Option<String>>,
}

impl UpdateProduct {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
        }
        if let Some(price) = self.price_cents {
            validate_price(price)?;
        }
        if let Some(stock) = self.stock
            && stock < 0
        {
            return Err(AppError::BadRequest(msg::INVALID_STOCK.into()));
        }
        if let Some(ref currency) = self.currency {
            validate_currency(currency)?;
        }
        Ok(())
    }
}

/// Product as shown on a public storefront.
#[derive(Debug, Clone, Serialize)]
pub struct StorefrontProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub available: i64,
    pub image_url: Option<String>,
}

impl From<Product> for StorefrontProduct {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            price_cents: p.price_cents,
            currency: p.currency,
            available: p.stock,
            image_url: p.image_url,
        }
    }
}
