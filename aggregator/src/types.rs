use serde::{Deserialize, Serialize};

/// Core profile group fetched from the users upstream. This is the only
/// essential field group: without it the whole aggregation fails.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_banned: bool,
}

/// The aggregated per-request result.
///
/// `errors` collects one human-readable message per optional field group
/// that failed; it is always serialized, possibly empty, and is never a
/// failure signal to the transport layer.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub id: u64,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_banned: bool,
    pub thumbnail_url: Option<String>,
    pub presence: i64,
    pub follower_count: u64,
    pub following_count: u64,
    pub friends_count: u64,
    pub username_history: Vec<String>,
    pub games: Vec<serde_json::Value>,
    pub can_view: bool,
    pub errors: Vec<String>,
}
