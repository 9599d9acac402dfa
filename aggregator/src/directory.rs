use crate::errors::DirectoryError;
use crate::types::Profile;
use async_trait::async_trait;
use outbound::OutboundClient;
use serde::Deserialize;
use serde_json::json;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// The user directory: one call per upstream field group.
///
/// Every call can fail independently; the aggregation engine never assumes
/// failures are correlated. Implementations must be cheap to share across
/// concurrent requests.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Batch username lookup. `NotFound` when the upstream reports no
    /// match for the username.
    async fn resolve_username(&self, username: &str) -> DirectoryResult<u64>;

    async fn profile(&self, user_id: u64) -> DirectoryResult<Profile>;
    async fn thumbnail_url(&self, user_id: u64) -> DirectoryResult<Option<String>>;
    async fn presence(&self, user_id: u64) -> DirectoryResult<i64>;
    async fn follower_count(&self, user_id: u64) -> DirectoryResult<u64>;
    async fn following_count(&self, user_id: u64) -> DirectoryResult<u64>;
    async fn friends_count(&self, user_id: u64) -> DirectoryResult<u64>;
    async fn username_history(&self, user_id: u64) -> DirectoryResult<Vec<String>>;
    async fn games(&self, user_id: u64) -> DirectoryResult<Vec<serde_json::Value>>;
    async fn can_view_inventory(&self, user_id: u64) -> DirectoryResult<bool>;
}

const USERNAME_HISTORY_LIMIT: u32 = 10;
const GAMES_LIMIT: u32 = 10;

/// Directory implementation over the Roblox REST upstreams, with every
/// call routed through the outbound proxy layer.
pub struct HttpDirectory {
    client: OutboundClient,
    users_base: String,
    thumbnails_base: String,
    presence_base: String,
    friends_base: String,
    games_base: String,
    inventory_base: String,
}

impl HttpDirectory {
    pub fn new(client: OutboundClient) -> Self {
        Self {
            client,
            users_base: "https://users.roblox.com".into(),
            thumbnails_base: "https://thumbnails.roblox.com".into(),
            presence_base: "https://presence.roblox.com".into(),
            friends_base: "https://friends.roblox.com".into(),
            games_base: "https://games.roblox.com".into(),
            inventory_base: "https://inventory.roblox.com".into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> DirectoryResult<T> {
        let response = self.client.get(url).await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// GET /v1/users/{id}/{followers,followings,friends}/count
    async fn count(&self, url: &str) -> DirectoryResult<u64> {
        #[derive(Deserialize)]
        struct CountResponse {
            #[serde(default)]
            count: u64,
        }

        Ok(self.get_json::<CountResponse>(url).await?.count)
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn resolve_username(&self, username: &str) -> DirectoryResult<u64> {
        #[derive(Deserialize)]
        struct Match {
            id: u64,
        }
        #[derive(Deserialize)]
        struct LookupResponse {
            #[serde(default)]
            data: Vec<Match>,
        }

        let url = format!("{}/v1/usernames/users", self.users_base);
        let payload = json!({
            "usernames": [username],
            "excludeBannedUsers": true,
        });
        let response = self
            .client
            .post_json(&url, &payload)
            .await?
            .error_for_status()?;
        let lookup: LookupResponse = response.json().await?;

        match lookup.data.first() {
            Some(m) => Ok(m.id),
            None => Err(DirectoryError::NotFound),
        }
    }

    async fn profile(&self, user_id: u64) -> DirectoryResult<Profile> {
        let url = format!("{}/v1/users/{user_id}", self.users_base);
        self.get_json(&url).await
    }

    async fn thumbnail_url(&self, user_id: u64) -> DirectoryResult<Option<String>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Thumbnail {
            #[serde(default)]
            image_url: Option<String>,
        }
        #[derive(Deserialize)]
        struct ThumbnailResponse {
            #[serde(default)]
            data: Vec<Thumbnail>,
        }

        let url = format!(
            "{}/v1/users/avatar?userIds={user_id}&size=720x720&format=Png&isCircular=false",
            self.thumbnails_base
        );
        let response: ThumbnailResponse = self.get_json(&url).await?;
        Ok(response.data.into_iter().next().and_then(|t| t.image_url))
    }

    async fn presence(&self, user_id: u64) -> DirectoryResult<i64> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Presence {
            user_presence_type: i64,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PresenceResponse {
            #[serde(default)]
            user_presences: Vec<Presence>,
        }

        let url = format!("{}/v1/presence/users", self.presence_base);
        let payload = json!({ "userIds": [user_id] });
        let response = self
            .client
            .post_json(&url, &payload)
            .await?
            .error_for_status()?;
        let presence: PresenceResponse = response.json().await?;

        // Offline when the upstream has no presence record.
        Ok(presence
            .user_presences
            .first()
            .map(|p| p.user_presence_type)
            .unwrap_or(0))
    }

    async fn follower_count(&self, user_id: u64) -> DirectoryResult<u64> {
        let url = format!("{}/v1/users/{user_id}/followers/count", self.friends_base);
        self.count(&url).await
    }

    async fn following_count(&self, user_id: u64) -> DirectoryResult<u64> {
        let url = format!("{}/v1/users/{user_id}/followings/count", self.friends_base);
        self.count(&url).await
    }

    async fn friends_count(&self, user_id: u64) -> DirectoryResult<u64> {
        let url = format!("{}/v1/users/{user_id}/friends/count", self.friends_base);
        self.count(&url).await
    }

    async fn username_history(&self, user_id: u64) -> DirectoryResult<Vec<String>> {
        #[derive(Deserialize)]
        struct HistoryEntry {
            name: String,
        }
        #[derive(Deserialize)]
        struct HistoryResponse {
            #[serde(default)]
            data: Vec<HistoryEntry>,
        }

        let url = format!(
            "{}/v1/users/{user_id}/username-history?limit={USERNAME_HISTORY_LIMIT}",
            self.users_base
        );
        let response: HistoryResponse = self.get_json(&url).await?;
        Ok(response.data.into_iter().map(|e| e.name).collect())
    }

    async fn games(&self, user_id: u64) -> DirectoryResult<Vec<serde_json::Value>> {
        #[derive(Deserialize)]
        struct GamesResponse {
            #[serde(default)]
            data: Vec<serde_json::Value>,
        }

        let url = format!(
            "{}/v2/users/{user_id}/games?accessFilter=2&limit={GAMES_LIMIT}&sortOrder=Asc",
            self.games_base
        );
        Ok(self.get_json::<GamesResponse>(&url).await?.data)
    }

    async fn can_view_inventory(&self, user_id: u64) -> DirectoryResult<bool> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CanViewResponse {
            #[serde(default)]
            can_view: bool,
        }

        let url = format!(
            "{}/v1/users/{user_id}/can-view-inventory",
            self.inventory_base
        );
        Ok(self.get_json::<CanViewResponse>(&url).await?.can_view)
    }
}
