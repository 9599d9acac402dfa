use crate::directory::{Directory, DirectoryResult};
use crate::errors::{AggregateError, DirectoryError};
use crate::types::UserDetails;
use std::sync::Arc;

/// Orchestrates the per-request fan-out across the directory upstreams.
///
/// The profile group is a hard gate: its failure aborts the request. The
/// eight optional groups are fetched concurrently and each one degrades
/// independently to its default, recording a message in the result's
/// `errors` list.
pub struct Aggregator {
    directory: Arc<dyn Directory>,
}

impl Aggregator {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Resolves a username to a user id through the batch lookup.
    ///
    /// There is no degraded path here: an unresolvable username aborts the
    /// whole request.
    pub async fn resolve_identifier(&self, username: &str) -> Result<u64, AggregateError> {
        match self.directory.resolve_username(username).await {
            Ok(id) => Ok(id),
            Err(DirectoryError::NotFound) => Err(AggregateError::NotFound),
            Err(DirectoryError::Upstream(cause)) => Err(AggregateError::Upstream(format!(
                "Failed to fetch user ID from username: {cause}"
            ))),
        }
    }

    pub async fn fetch_details(&self, user_id: u64) -> Result<UserDetails, AggregateError> {
        let profile = self.directory.profile(user_id).await.map_err(|e| {
            AggregateError::Upstream(format!("Failed to fetch user profile: {e}"))
        })?;

        let d = &self.directory;
        let (thumbnail, presence, followers, following, friends, history, games, can_view) = tokio::join!(
            d.thumbnail_url(user_id),
            d.presence(user_id),
            d.follower_count(user_id),
            d.following_count(user_id),
            d.friends_count(user_id),
            d.username_history(user_id),
            d.games(user_id),
            d.can_view_inventory(user_id),
        );

        let mut errors = Vec::new();
        let details = UserDetails {
            id: user_id,
            name: profile.name,
            display_name: profile.display_name,
            description: profile.description,
            is_banned: profile.is_banned,
            thumbnail_url: or_default(thumbnail, None, "thumbnail", &mut errors),
            presence: or_default(presence, 0, "presence", &mut errors),
            follower_count: or_default(followers, 0, "follower count", &mut errors),
            following_count: or_default(following, 0, "following count", &mut errors),
            friends_count: or_default(friends, 0, "friends count", &mut errors),
            username_history: or_default(history, Vec::new(), "username history", &mut errors),
            games: or_default(games, Vec::new(), "user games", &mut errors),
            can_view: or_default(can_view, false, "inventory visibility", &mut errors),
            errors,
        };

        Ok(details)
    }
}

/// Collapses an optional-field result to its value or a documented
/// default, recording the failure.
fn or_default<T>(
    result: DirectoryResult<T>,
    default: T,
    field: &str,
    errors: &mut Vec<String>,
) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(field, error = %err, "optional field degraded");
            metrics::counter!("aggregator.degraded_field").increment(1);
            errors.push(format!("Failed to fetch {field}: {err}"));
            default
        }
    }
}
