use serde::Deserialize;

/// Contact as returned by the public contact endpoints.
///
/// `source_id` is the opaque contact identifier all other public endpoints
/// key on; `pubsub_token` scopes the realtime subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactRecord {
    pub id: i64,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub pubsub_token: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// One conversation thread, as listed by the history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub contact_last_seen_at: Option<i64>,
    #[serde(default)]
    pub agent_last_seen_at: Option<i64>,
}
