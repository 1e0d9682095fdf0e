use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    /// Following yourself is silently ignored.
    SelfFollow,
}

pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        requester_id: i64,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))?;

        if author.id == requester_id {
            debug!(
                target = "yatube::application::follow",
                user_id = requester_id,
                "ignoring self-follow"
            );
            return Ok(FollowOutcome::SelfFollow);
        }

        if self.follows.follow(requester_id, author.id).await? {
            info!(
                target = "yatube::application::follow",
                user_id = requester_id,
                author = %author.username,
                "follow created"
            );
            Ok(FollowOutcome::Created)
        } else {
            debug!(
                target = "yatube::application::follow",
                user_id = requester_id,
                author = %author.username,
                "already following"
            );
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Remove the subscription if present. An unknown username is not an error.
    pub async fn unfollow(&self, requester_id: i64, username: &str) -> Result<bool, FollowError> {
        let Some(author) = self.users.find_by_username(username).await? else {
            return Ok(false);
        };

        let removed = self.follows.unfollow(requester_id, author.id).await?;
        if removed {
            info!(
                target = "yatube::application::follow",
                user_id = requester_id,
                author = %author.username,
                "follow removed"
            );
        }
        Ok(removed)
    }
}
