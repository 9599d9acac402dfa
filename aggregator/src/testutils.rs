//! Test support: an in-memory directory with scriptable per-call failures.

use crate::directory::{Directory, DirectoryResult};
use crate::errors::DirectoryError;
use crate::types::Profile;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;

/// Directory backed by canned values. Individual calls can be made to
/// fail by name: `resolve`, `profile`, `thumbnail`, `presence`,
/// `followers`, `following`, `friends`, `history`, `games`, `can_view`.
#[derive(Clone, Default)]
pub struct MockDirectory {
    pub username: String,
    pub user_id: u64,
    pub profile: Option<Profile>,
    failing: HashSet<&'static str>,
}

impl MockDirectory {
    /// A directory where every call succeeds for user `robloxuser` / 123.
    pub fn healthy() -> Self {
        Self {
            username: "robloxuser".into(),
            user_id: 123,
            profile: Some(Profile {
                name: "robloxuser".into(),
                display_name: "Roblox User".into(),
                description: Some("hello".into()),
                is_banned: false,
            }),
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, calls: &[&'static str]) -> Self {
        self.failing.extend(calls);
        self
    }

    fn check(&self, call: &'static str) -> DirectoryResult<()> {
        if self.failing.contains(call) {
            Err(DirectoryError::Upstream(format!("{call} upstream down")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn resolve_username(&self, username: &str) -> DirectoryResult<u64> {
        self.check("resolve")?;
        if username == self.username {
            Ok(self.user_id)
        } else {
            Err(DirectoryError::NotFound)
        }
    }

    async fn profile(&self, _user_id: u64) -> DirectoryResult<Profile> {
        self.check("profile")?;
        self.profile
            .clone()
            .ok_or_else(|| DirectoryError::Upstream("no profile configured".into()))
    }

    async fn thumbnail_url(&self, _user_id: u64) -> DirectoryResult<Option<String>> {
        self.check("thumbnail")?;
        Ok(Some("https://cdn.example/avatar.png".into()))
    }

    async fn presence(&self, _user_id: u64) -> DirectoryResult<i64> {
        self.check("presence")?;
        Ok(2)
    }

    async fn follower_count(&self, _user_id: u64) -> DirectoryResult<u64> {
        self.check("followers")?;
        Ok(10)
    }

    async fn following_count(&self, _user_id: u64) -> DirectoryResult<u64> {
        self.check("following")?;
        Ok(5)
    }

    async fn friends_count(&self, _user_id: u64) -> DirectoryResult<u64> {
        self.check("friends")?;
        Ok(3)
    }

    async fn username_history(&self, _user_id: u64) -> DirectoryResult<Vec<String>> {
        self.check("history")?;
        Ok(vec!["oldname".into()])
    }

    async fn games(&self, _user_id: u64) -> DirectoryResult<Vec<serde_json::Value>> {
        self.check("games")?;
        Ok(vec![json!({"id": 1, "name": "Test Game"})])
    }

    async fn can_view_inventory(&self, _user_id: u64) -> DirectoryResult<bool> {
        self.check("can_view")?;
        Ok(true)
    }
}
