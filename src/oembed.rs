//! Video URL classification and oEmbed metadata lookup.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::{Host, Url};

use crate::error::{AppError, Result, msg};
use crate::models::{EmbedMetadata, Platform};

const YOUTUBE_OEMBED: &str = "https://www.youtube.com/oembed";
const TIKTOK_OEMBED: &str = "https://www.tiktok.com/oembed";

const MAX_TEXT_CHARS: usize = 200;
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Validate a seller-supplied video link and work out which platform hosts it.
///
/// Only public https URLs are accepted. Unknown hosts are allowed as `Other`.
pub fn classify_url(raw: &str) -> Result<(Platform, Url)> {
    let url = Url::parse(raw.trim()).map_err(|_| AppError::BadRequest(msg::INVALID_URL.into()))?;
    if url.scheme() != "https" {
        return Err(AppError::BadRequest(msg::INVALID_URL.into()));
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
        // IP literals and missing hosts
        _ => return Err(AppError::BadRequest(msg::INVALID_URL.into())),
    };
    if host == "localhost" || host.ends_with(".localhost") || !host.contains('.') {
        return Err(AppError::BadRequest(msg::INVALID_URL.into()));
    }

    let platform = if host_matches(&host, "tiktok.com") {
        Platform::Tiktok
    } else if host_matches(&host, "instagram.com") {
        Platform::Instagram
    } else if host_matches(&host, "facebook.com") || host_matches(&host, "fb.watch") {
        Platform::Facebook
    } else if host_matches(&host, "youtube.com") || host_matches(&host, "youtu.be") {
        Platform::Youtube
    } else {
        Platform::Other
    };

    Ok((platform, url))
}

/// Raw oEmbed response. Only the fields we keep are read; `html` is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct OEmbedResponse {
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Strip markup and control characters, collapse whitespace, and cap length.
fn clean_text(input: &str) -> Option<String> {
    let mut stripped = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                stripped.push(' ');
            }
            _ if in_tag => {}
            c if c.is_control() => stripped.push(' '),
            c => stripped.push(c),
        }
    }

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_TEXT_CHARS).collect();
    let truncated = truncated.trim_end().to_string();
    (!truncated.is_empty()).then_some(truncated)
}

fn clean_thumbnail(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    (url.scheme() == "https" && matches!(url.host(), Some(Host::Domain(_)))).then(|| url.to_string())
}

/// Reduce a provider response to the metadata we store.
pub fn sanitize_metadata(raw: OEmbedResponse) -> EmbedMetadata {
    EmbedMetadata {
        title: raw.title.as_deref().and_then(clean_text),
        author_name: raw.author_name.as_deref().and_then(clean_text),
        thumbnail_url: raw.thumbnail_url.as_deref().and_then(clean_thumbnail),
    }
}

/// Best-effort oEmbed lookups. Failures are logged and yield `None`.
#[derive(Debug, Clone)]
pub struct OEmbedClient {
    client: Option<Client>,
}

impl OEmbedClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client: Some(client),
        }
    }

    /// A client that never makes network calls (tests, offline dev).
    pub fn disabled() -> Self {
        Self { client: None }
    }

    fn endpoint(platform: Platform) -> Option<&'static str> {
        match platform {
            Platform::Youtube => Some(YOUTUBE_OEMBED),
            Platform::Tiktok => Some(TIKTOK_OEMBED),
            // Instagram and Facebook require an app token.
            Platform::Instagram | Platform::Facebook | Platform::Other => None,
        }
    }

    pub async fn fetch(&self, platform: Platform, url: &Url) -> Option<EmbedMetadata> {
        let client = self.client.as_ref()?;
        let endpoint = Self::endpoint(platform)?;

        let response = match client
            .get(endpoint)
            .query(&[("url", url.as_str()), ("format", "json")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%url, "oEmbed request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(%url, status = %response.status(), "oEmbed lookup rejected");
            return None;
        }

        match response.json::<OEmbedResponse>().await {
            Ok(raw) => Some(sanitize_metadata(raw)),
            Err(e) => {
                tracing::warn!(%url, "Failed to parse oEmbed response: {}", e);
                None
            }
        }
    }
}

impl Default for OEmbedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_platforms() {
        let cases = [
            ("https://www.tiktok.com/@shop/live", Platform::Tiktok),
            ("https://instagram.com/p/abc", Platform::Instagram),
            ("https://fb.watch/xyz", Platform::Facebook),
            ("https://m.facebook.com/watch?v=1", Platform::Facebook),
            ("https://youtu.be/dQw4w9WgXcQ", Platform::Youtube),
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Platform::Youtube),
            ("https://vimeo.com/123", Platform::Other),
        ];
        for (url, expected) in cases {
            assert_eq!(classify_url(url).unwrap().0, expected, "{}", url);
        }
    }

    #[test]
    fn lookalike_host_is_not_a_platform() {
        assert_eq!(
            classify_url("https://nottiktok.com/live").unwrap().0,
            Platform::Other
        );
    }

    #[test]
    fn rejects_non_public_urls() {
        for url in [
            "http://youtube.com/watch?v=1",
            "https://127.0.0.1/video",
            "https://[::1]/video",
            "https://localhost/video",
            "https://intranet/video",
            "not a url",
            "javascript:alert(1)",
        ] {
            assert!(classify_url(url).is_err(), "{}", url);
        }
    }

    #[test]
    fn sanitize_strips_markup_and_unsafe_thumbnails() {
        let meta = sanitize_metadata(OEmbedResponse {
            title: Some("  <b>Spring</b>\n\tdrop\u{0007} live ".into()),
            author_name: Some("<script>x</script>".into()),
            thumbnail_url: Some("http://i.ytimg.com/vi/1/hq.jpg".into()),
        });
        assert_eq!(meta.title.as_deref(), Some("Spring drop live"));
        assert_eq!(meta.author_name.as_deref(), Some("x"));
        assert_eq!(meta.thumbnail_url, None);
    }

    #[test]
    fn sanitize_truncates_long_titles() {
        let meta = sanitize_metadata(OEmbedResponse {
            title: Some("a".repeat(500)),
            author_name: None,
            thumbnail_url: Some("https://i.ytimg.com/vi/1/hq.jpg".into()),
        });
        assert_eq!(meta.title.unwrap().chars().count(), MAX_TEXT_CHARS);
        assert_eq!(meta.thumbnail_url.as_deref(), Some("https://i.ytimg.com/vi/1/hq.jpg"));
    }
}
