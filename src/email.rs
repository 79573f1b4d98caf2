//! Transactional email via the Resend API.
//!
//! Two messages are sent: the buyer's order confirmation and the "now live"
//! alert to a seller's subscribers. Without an API key, sends are logged and
//! skipped.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp for display (e.g., "Jan 15, 2024 18:00 UTC")
fn format_datetime(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// Format minor units with the currency code (e.g., "12.50 USD").
pub fn format_money(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!(
        "{}{}.{:02} {}",
        sign,
        cents / 100,
        cents % 100,
        currency.to_ascii_uppercase()
    )
}

/// Escape text for interpolation into HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    /// Email was sent successfully via Resend
    Sent,
    /// No API key configured
    NoApiKey,
}

/// A rendered message.
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub seller_name: String,
    pub product_name: String,
    pub quantity: i64,
    pub total_cents: i64,
    pub currency: String,
}

impl OrderConfirmation {
    pub fn render(&self) -> EmailContent {
        let total = format_money(self.total_cents, &self.currency);
        let subject = format!("Your order from {}", self.seller_name);
        let text = format!(
            "Thanks for your order!\n\n{} x {}\nTotal: {}\nSold by: {}\n\nOrder reference: {}\n\nThe seller will be in touch about delivery.",
            self.quantity, self.product_name, total, self.seller_name, self.order_id
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Thanks for your order!</h2>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px;">
<p style="margin: 0 0 8px;"><strong>{}</strong> &times; {}</p>
<p style="margin: 0 0 8px;">Total: <strong>{}</strong></p>
<p style="margin: 0;">Sold by {}</p>
</div>
<p style="color: #666; font-size: 14px;">Order reference: <code>{}</code></p>
<p style="color: #666;">The seller will be in touch about delivery.</p>
</body>
</html>"#,
            escape_html(&self.product_name),
            self.quantity,
            escape_html(&total),
            escape_html(&self.seller_name),
            escape_html(&self.order_id),
        );
        EmailContent { subject, text, html }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayAlert {
    pub seller_name: String,
    pub replay_title: String,
    pub storefront_url: String,
    pub expires_at: i64,
    pub unsubscribe_url: String,
}

impl ReplayAlert {
    pub fn render(&self) -> EmailContent {
        let expires = format_datetime(self.expires_at);
        let subject = format!("{} is live: {}", self.seller_name, self.replay_title);
        let text = format!(
            "{} just opened a new replay shop: {}\n\nShop now: {}\nAvailable until {}.\n\nUnsubscribe: {}",
            self.seller_name, self.replay_title, self.storefront_url, expires, self.unsubscribe_url
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">{} is live</h2>
<p><strong>{}</strong></p>
<p><a href="{}" style="display: inline-block; background: #111; color: #fff; padding: 12px 20px; border-radius: 6px; text-decoration: none;">Shop the replay</a></p>
<p style="color: #666;">Available until {}.</p>
<p style="color: #999; font-size: 12px;"><a href="{}" style="color: #999;">Unsubscribe</a></p>
</body>
</html>"#,
            escape_html(&self.seller_name),
            escape_html(&self.replay_title),
            escape_html(&self.storefront_url),
            expires,
            escape_html(&self.unsubscribe_url),
        );
        EmailContent { subject, text, html }
    }
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Email service using Resend API.
#[derive(Clone)]
pub struct EmailService {
    api_key: Option<String>,
    from_email: String,
    http_client: Client,
}

impl EmailService {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }

    /// A service that never sends (tests, local dev without a key).
    pub fn disabled() -> Self {
        Self::new(None, "ReplaySell <noreply@localhost>".to_string())
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn send(&self, to_email: &str, content: &EmailContent) -> Result<EmailSendResult> {
        let Some(ref api_key) = self.api_key else {
            tracing::debug!(to = %to_email, subject = %content.subject, "No Resend API key, skipping email");
            return Ok(EmailSendResult::NoApiKey);
        };

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to_email],
            subject: &content.subject,
            text: &content.text,
            html: &content.html,
        };
        self.send_with_retry(api_key, &request, to_email).await
    }

    async fn send_with_retry(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
        to_email: &str,
    ) -> Result<EmailSendResult> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying email send after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(api_key, request).await {
                Ok(()) => {
                    tracing::info!(attempt, to = %to_email, subject = %request.subject, "Email sent via Resend");
                    return Ok(EmailSendResult::Sent);
                }
                Err((error, true)) => last_error = Some(error),
                Err((error, false)) => return Err(error),
            }
        }

        tracing::error!(
            to = %to_email,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email service error: all retries exhausted".into())
        }))
    }

    /// Send a single request to Resend API.
    ///
    /// Returns Ok(()) on success, or Err((AppError, is_transient)) on failure.
    async fn send_resend_request(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                (AppError::Upstream(format!("Email service error: {}", e)), true)
            })?;

        let status = response.status();
        if status.is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                (AppError::Upstream("Email service response error".into()), false)
            })?;
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let is_transient = status.as_u16() == 429 || status.is_server_error();
        if is_transient {
            tracing::warn!(status = %status, body = %body, "Resend API returned transient error");
        } else {
            tracing::error!(status = %status, body = %body, "Resend API returned non-transient error");
        }

        Err((
            AppError::Upstream(format!("Email service error: {} - {}", status, body)),
            is_transient,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_is_formatted_in_major_units() {
        assert_eq!(format_money(1250, "usd"), "12.50 USD");
        assert_eq!(format_money(5, "eur"), "0.05 EUR");
        assert_eq!(format_money(-300, "usd"), "-3.00 USD");
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(
            escape_html(r#"<b>"Tom & Jerry's"</b>"#),
            "&lt;b&gt;&quot;Tom &amp; Jerry&#39;s&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn order_confirmation_escapes_user_text() {
        let content = OrderConfirmation {
            order_id: "ord_1".into(),
            seller_name: "Ann <Shop>".into(),
            product_name: "Mug & Cup".into(),
            quantity: 2,
            total_cents: 3000,
            currency: "usd".into(),
        }
        .render();

        assert!(content.html.contains("Mug &amp; Cup"));
        assert!(content.html.contains("Ann &lt;Shop&gt;"));
        assert!(!content.html.contains("<Shop>"));
        assert!(content.text.contains("30.00 USD"));
        assert_eq!(content.subject, "Your order from Ann <Shop>");
    }

    #[test]
    fn replay_alert_links_to_storefront_and_unsubscribe() {
        let content = ReplayAlert {
            seller_name: "Ann".into(),
            replay_title: "Spring drop".into(),
            storefront_url: "https://replaysell.test/s/spring-drop-abc123".into(),
            expires_at: 1_700_000_000,
            unsubscribe_url: "https://replaysell.test/unsubscribe/tok".into(),
        }
        .render();

        assert!(content.html.contains("https://replaysell.test/s/spring-drop-abc123"));
        assert!(content.text.contains("https://replaysell.test/unsubscribe/tok"));
        assert!(content.text.contains("Nov 14, 2023"));
    }

    #[tokio::test]
    async fn disabled_service_skips_send() {
        let service = EmailService::disabled();
        let content = EmailContent {
            subject: "s".into(),
            text: "t".into(),
            html: "h".into(),
        };
        let result = service.send("buyer@example.com", &content).await.unwrap();
        assert_eq!(result, EmailSendResult::NoApiKey);
        assert!(!service.is_enabled());
    }
}
