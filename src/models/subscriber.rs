use serde::{Deserialize, Serialize};

/// A buyer who asked to be told when a seller goes live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub seller_id: String,
    pub email: String,
    /// Replay the buyer subscribed from, if any.
    pub source_replay_id: Option<String>,
    #[serde(skip_serializing)]
    pub unsubscribe_token: String,
    pub created_at: i64,
    pub unsubscribed_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}
