use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

/// Longest replay window a seller can request, in hours (30 days).
pub const MAX_REPLAY_HOURS: i64 = 720;

/// Social platform hosting the original live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Facebook,
    Youtube,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReplayStatus {
    Live,
    Expired,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    pub id: String,
    pub seller_id: String,
    pub slug: String,
    pub title: String,
    pub video_url: String,
    pub platform: Platform,
    pub embed_title: Option<String>,
    pub author_name: Option<String>,
    pub thumbnail_url: Option<String>,
    pub expires_at: i64,
    pub archived_at: Option<i64>,
    pub alerts_sent_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Replay {
    /// Archived wins over expired, expired wins over live.
    pub fn status_at(&self, now: i64) -> ReplayStatus {
        if self.archived_at.is_some() {
            ReplayStatus::Archived
        } else if now >= self.expires_at {
            ReplayStatus::Expired
        } else {
            ReplayStatus::Live
        }
    }

    pub fn is_live_at(&self, now: i64) -> bool {
        self.status_at(now) == ReplayStatus::Live
    }
}

/// Replay as returned by the seller API, with its status resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayView {
    #[serde(flatten)]
    pub replay: Replay,
    pub status: ReplayStatus,
}

impl ReplayView {
    pub fn at(replay: Replay, now: i64) -> Self {
        let status = replay.status_at(now);
        Self { replay, status }
    }
}

/// oEmbed-derived metadata kept alongside a replay. Provider HTML is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedMetadata {
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub thumbnail_url: Option<String>,
}

fn validate_hours(hours: i64) -> Result<()> {
    if !(1..=MAX_REPLAY_HOURS).contains(&hours) {
        return Err(AppError::BadRequest(msg::INVALID_EXPIRY_HOURS.into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateReplay {
    pub title: String,
    pub video_url: String,
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

impl CreateReplay {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest(msg::TITLE_EMPTY.into()));
        }
        if let Some(hours) = self.expires_in_hours {
            validate_hours(hours)?;
        }
        Ok(())
    }
}

/// Accepts either a missing field or a value; `null` is treated like missing.
fn deserialize_trimmed<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| v.trim().to_string()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateReplay {
    #[serde(default, deserialize_with = "deserialize_trimmed")]
    pub title: Option<String>,
    /// Resets the expiry to this many hours from now.
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

impl UpdateReplay {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref title) = self.title
            && title.is_empty()
        {
            return Err(AppError::BadRequest(msg::TITLE_EMPTY.into()));
        }
        if let Some(hours) = self.expires_in_hours {
            validate_hours(hours)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplayFilters {
    #[serde(default)]
    pub status: Option<ReplayStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(expires_at: i64, archived_at: Option<i64>) -> Replay {
        Replay {
            id: "r1".into(),
            seller_id: "s1".into(),
            slug: "spring-drop-abc123".into(),
            title: "Spring drop".into(),
            video_url: "https://www.tiktok.com/@shop/video/1".into(),
            platform: Platform::Tiktok,
            embed_title: None,
            author_name: None,
            thumbnail_url: None,
            expires_at,
            archived_at,
            alerts_sent_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn live_until_expiry() {
        let r = replay(1_000, None);
        assert_eq!(r.status_at(999), ReplayStatus::Live);
        assert_eq!(r.status_at(1_000), ReplayStatus::Expired);
        assert_eq!(r.status_at(5_000), ReplayStatus::Expired);
    }

    #[test]
    fn archived_takes_precedence() {
        let r = replay(1_000, Some(500));
        assert_eq!(r.status_at(10), ReplayStatus::Archived);
        assert_eq!(r.status_at(2_000), ReplayStatus::Archived);
    }

    #[test]
    fn expiry_hours_are_bounded() {
        let mut input = CreateReplay {
            title: "Drop".into(),
            video_url: "https://youtu.be/x".into(),
            expires_in_hours: Some(0),
        };
        assert!(input.validate().is_err());
        input.expires_in_hours = Some(MAX_REPLAY_HOURS + 1);
        assert!(input.validate().is_err());
        input.expires_in_hours = Some(MAX_REPLAY_HOURS);
        assert!(input.validate().is_ok());
    }
}
