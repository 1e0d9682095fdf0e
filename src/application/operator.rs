//! Out-of-band administration used by the command line: group management
//! and account removal.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError, UsersRepo};
use crate::domain::entities::GroupRecord;
use crate::domain::error::DomainError;
use crate::domain::posts::validate_group_title;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async, validate_slug};

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("group slug `{0}` is already taken")]
    SlugTaken(String),
    #[error("group `{0}` does not exist")]
    UnknownGroup(String),
    #[error("user `{0}` does not exist")]
    UnknownUser(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for OperatorError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(err) => Self::Slug(err),
            SlugAsyncError::Predicate(err) => Self::Repo(err),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
}

pub struct OperatorService {
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl OperatorService {
    pub fn new(groups: Arc<dyn GroupsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { groups, users }
    }

    /// Create a group. Without an explicit slug one is derived from the
    /// title and suffixed until unique; an explicit slug must be free.
    pub async fn create_group(&self, input: NewGroup) -> Result<GroupRecord, OperatorError> {
        let title = validate_group_title(&input.title)?;

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                validate_slug(slug)?;
                if self.groups.find_by_slug(slug).await?.is_some() {
                    return Err(OperatorError::SlugTaken(slug.to_string()));
                }
                slug.to_string()
            }
            _ => {
                let groups = self.groups.clone();
                generate_unique_slug_async(&title, |candidate| {
                    let groups = groups.clone();
                    let candidate = candidate.to_string();
                    async move {
                        let existing = groups.find_by_slug(&candidate).await?;
                        Ok::<bool, RepoError>(existing.is_none())
                    }
                })
                .await?
            }
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title,
                slug,
                description: input.description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { constraint } => OperatorError::SlugTaken(constraint),
                other => OperatorError::Repo(other),
            })?;

        info!(
            target = "yatube::application::operator",
            group_id = group.id,
            slug = %group.slug,
            title = %group.preview(),
            "group created"
        );
        Ok(group)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, OperatorError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn delete_group(&self, slug: &str) -> Result<(), OperatorError> {
        if !self.groups.delete_group(slug).await? {
            return Err(OperatorError::UnknownGroup(slug.to_string()));
        }
        info!(target = "yatube::application::operator", slug, "group deleted");
        Ok(())
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), OperatorError> {
        if !self.users.delete_user(username).await? {
            return Err(OperatorError::UnknownUser(username.to_string()));
        }
        info!(target = "yatube::application::operator", username, "user deleted");
        Ok(())
    }
}
