use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{BillingTarget, CheckoutLink, OrderCheckout, PaymentGateway, StripeV2Account, SubscriptionCheckout};
use crate::error::{AppError, Result, msg};
use crate::models::AccountSnapshot;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// API version sent with v2 (accounts) requests.
const V2_API_VERSION: &str = "2025-09-30.clover";

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
/// Stripe recommends 300 seconds (5 minutes).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Clock skew allowed for timestamps from the future.
const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at another host (e.g. stripe-mock).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn v1(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/v1/{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
    }

    fn v2(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/v2/{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .header("Stripe-Version", V2_API_VERSION)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe {} request failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            return Err(AppError::Upstream(format!(
                "Stripe {} failed ({}): {}",
                what, status, message
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe {} response: {}", what, e)))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_customer(&self, email: &str, name: &str, seller_id: &str) -> Result<String> {
        let request = self.v1("customers").form(&[
            ("email", email),
            ("name", name),
            ("metadata[seller_id]", seller_id),
        ]);
        let customer: IdResponse = Self::send(request, "customer").await?;
        Ok(customer.id)
    }

    async fn create_subscription_checkout(&self, req: &SubscriptionCheckout) -> Result<CheckoutLink> {
        let (target_field, target_id) = match &req.target {
            BillingTarget::Customer(id) => ("customer", id.as_str()),
            BillingTarget::CustomerAccount(id) => ("customer_account", id.as_str()),
        };
        let request = self.v1("checkout/sessions").form(&[
            ("mode", "subscription"),
            (target_field, target_id),
            ("line_items[0][price]", req.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", req.success_url.as_str()),
            ("cancel_url", req.cancel_url.as_str()),
            ("metadata[seller_id]", req.seller_id.as_str()),
            ("metadata[kind]", req.kind.as_ref()),
            ("subscription_data[metadata][seller_id]", req.seller_id.as_str()),
            ("subscription_data[metadata][kind]", req.kind.as_ref()),
        ]);
        let session: SessionResponse = Self::send(request, "subscription checkout").await?;
        Ok(CheckoutLink {
            id: session.id,
            url: session.url,
        })
    }

    async fn create_billing_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String> {
        let request = self
            .v1("billing_portal/sessions")
            .form(&[("customer", customer_id), ("return_url", return_url)]);
        let portal: UrlResponse = Self::send(request, "billing portal").await?;
        Ok(portal.url)
    }

    async fn create_connected_account(&self, email: &str, display_name: &str, seller_id: &str) -> Result<String> {
        let body = json!({
            "contact_email": email,
            "display_name": display_name,
            "dashboard": "full",
            "defaults": {
                "responsibilities": {
                    "fees_collector": "stripe",
                    "losses_collector": "stripe"
                }
            },
            "configuration": {
                "merchant": {
                    "capabilities": { "card_payments": { "requested": true } }
                },
                "customer": {}
            },
            "metadata": { "seller_id": seller_id }
        });
        let request = self.v2(reqwest::Method::POST, "core/accounts").json(&body);
        let account: IdResponse = Self::send(request, "account").await?;
        Ok(account.id)
    }

    async fn create_account_link(&self, account_id: &str, refresh_url: &str, return_url: &str) -> Result<String> {
        let body = json!({
            "account": account_id,
            "use_case": {
                "type": "account_onboarding",
                "account_onboarding": {
                    "configurations": ["merchant", "customer"],
                    "refresh_url": refresh_url,
                    "return_url": return_url
                }
            }
        });
        let request = self.v2(reqwest::Method::POST, "core/account_links").json(&body);
        let link: UrlResponse = Self::send(request, "account link").await?;
        Ok(link.url)
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<AccountSnapshot> {
        let request = self
            .v2(reqwest::Method::GET, &format!("core/accounts/{}", account_id))
            .query(&[("include", "configuration.merchant"), ("include", "requirements")]);
        let account: StripeV2Account = Self::send(request, "account retrieval").await?;
        Ok(account.to_snapshot())
    }

    async fn create_order_checkout(&self, req: &OrderCheckout) -> Result<CheckoutLink> {
        let unit_amount = req.unit_amount.to_string();
        let quantity = req.quantity.to_string();
        let fee = req.application_fee.to_string();
        let expires_at = req.expires_at.to_string();

        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", req.success_url.as_str()),
            ("cancel_url", req.cancel_url.as_str()),
            ("line_items[0][price_data][currency]", req.currency.as_str()),
            ("line_items[0][price_data][unit_amount]", unit_amount.as_str()),
            ("line_items[0][price_data][product_data][name]", req.product_name.as_str()),
            ("line_items[0][quantity]", quantity.as_str()),
            ("expires_at", expires_at.as_str()),
            ("metadata[order_id]", req.order_id.as_str()),
            ("payment_intent_data[metadata][order_id]", req.order_id.as_str()),
        ];
        if req.application_fee > 0 {
            form.push(("payment_intent_data[application_fee_amount]", fee.as_str()));
        }
        if let Some(ref email) = req.customer_email {
            form.push(("customer_email", email.as_str()));
        }

        // Direct charge: the session lives on the connected account.
        let request = self
            .v1("checkout/sessions")
            .header("Stripe-Account", &req.connected_account_id)
            .form(&form);
        let session: SessionResponse = Self::send(request, "order checkout").await?;
        Ok(CheckoutLink {
            id: session.id,
            url: session.url,
        })
    }
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// A malformed header is an error; a wrong signature or a timestamp outside
/// the tolerance window is `Ok(false)`.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> Result<bool> {
    verify_webhook_signature_at(payload, signature, secret, chrono::Utc::now().timestamp())
}

fn verify_webhook_signature_at(payload: &[u8], signature: &str, secret: &str, now: i64) -> Result<bool> {
    // Stripe signature format: t=timestamp,v1=signature[,v1=signature...]
    // Several v1 entries appear while a secret is being rolled.
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in signature.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            candidates.push(s);
        }
    }

    let timestamp_str =
        timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
    if candidates.is_empty() {
        return Err(AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()));
    }

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

    let age = now - timestamp;
    if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
            age,
            WEBHOOK_TIMESTAMP_TOLERANCE_SECS
        );
        return Ok(false);
    }
    if age < -WEBHOOK_FUTURE_SKEW_SECS {
        tracing::warn!("Stripe webhook rejected: timestamp in the future (age={}s)", age);
        return Ok(false);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    let expected_bytes = expected.as_bytes();

    // Length isn't secret (always 64 hex chars), the contents are.
    Ok(candidates.iter().any(|candidate| {
        let provided = candidate.as_bytes();
        provided.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(provided))
    }))
}
