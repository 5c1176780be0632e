use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Availability of one agent as reported by presence events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Online,
    Offline,
    Busy,
}

/// Agent id -> availability. Wholesale-replaced on every presence event,
/// never merged field-by-field.
pub type UserStatusMap = HashMap<i64, Availability>;

/// A support agent, as returned by the account-scoped agents endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Agent {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub available_name: String,
    #[serde(default)]
    pub availability_status: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}
