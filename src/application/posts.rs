//! Post and comment authoring.
//!
//! Every write validates the whole form first. The image is only handed to
//! the [`ImageStore`] once text and group are known to be good, and it is
//! removed again when the database write fails, so a rejected submission
//! leaves neither a row nor a file behind.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::forms::FormErrors;
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::domain::posts::{validate_comment_text, validate_post_text};

const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
const EMPTY_FILE: &str = "The submitted file is empty.";

#[derive(Debug, Error)]
#[error("image storage failed: {message}")]
pub struct ImageStoreError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ImageStoreError {
    pub fn new(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Where accepted post images are kept. Returns the stored relative path.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, upload: &ImageUpload) -> Result<String, ImageStoreError>;

    async fn remove(&self, stored_path: &str) -> Result<(), ImageStoreError>;
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Raw post form fields. `group` is the submitted select value: a group id
/// or empty for "no group".
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub text: String,
    pub group: Option<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("invalid post form: {0}")]
    Invalid(FormErrors),
    #[error("unknown post {0}")]
    UnknownPost(i64),
    #[error("user {user_id} is not the author of post {post_id}")]
    NotAuthor { post_id: i64, user_id: i64 },
    #[error(transparent)]
    Storage(#[from] ImageStoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

struct ValidatedPost {
    text: String,
    group_id: Option<i64>,
    image: Option<ImageUpload>,
}

pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    images: Arc<dyn ImageStore>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            images,
        }
    }

    /// Groups offered by the post form's select.
    pub async fn groups(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create(&self, author_id: i64, input: PostInput) -> Result<PostRecord, PostError> {
        let validated = self.validate(input).await?;
        let image = self.store_image(validated.image.as_ref()).await?;

        let params = CreatePostParams {
            author_id,
            text: validated.text,
            group_id: validated.group_id,
            image: image.clone(),
        };

        match self.writer.create_post(params).await {
            Ok(post) => {
                info!(
                    target = "yatube::application::posts",
                    post_id = post.id,
                    author_id,
                    preview = %post.preview(),
                    "post created"
                );
                Ok(post)
            }
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                Err(err.into())
            }
        }
    }

    /// Load a post for editing by `user_id`.
    pub async fn editable(&self, post_id: i64, user_id: i64) -> Result<PostRecord, PostError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::UnknownPost(post_id))?;

        if !post.is_authored_by(user_id) {
            return Err(PostError::NotAuthor { post_id, user_id });
        }
        Ok(post)
    }

    pub async fn update(
        &self,
        post_id: i64,
        user_id: i64,
        input: PostInput,
    ) -> Result<PostRecord, PostError> {
        let current = self.editable(post_id, user_id).await?;
        let validated = self.validate(input).await?;
        let new_image = self.store_image(validated.image.as_ref()).await?;

        let params = UpdatePostParams {
            id: current.id,
            text: validated.text,
            group_id: validated.group_id,
            image: new_image.clone().or_else(|| current.image.clone()),
        };

        match self.writer.update_post(params).await {
            Ok(post) => {
                if new_image.is_some() {
                    self.discard_image(current.image.as_deref()).await;
                }
                info!(
                    target = "yatube::application::posts",
                    post_id = post.id,
                    preview = %post.preview(),
                    "post updated"
                );
                Ok(post)
            }
            Err(err) => {
                self.discard_image(new_image.as_deref()).await;
                Err(err.into())
            }
        }
    }

    pub async fn add_comment(
        &self,
        post_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<CommentRecord, PostError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::UnknownPost(post_id))?;

        let text = validate_comment_text(text)
            .map_err(|err| {
                let mut errors = FormErrors::new();
                errors.add_domain(err);
                PostError::Invalid(errors)
            })?;

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id,
                text,
            })
            .await?;
        info!(
            target = "yatube::application::posts",
            post_id = post.id,
            comment_id = comment.id,
            "comment added"
        );
        Ok(comment)
    }

    async fn validate(&self, input: PostInput) -> Result<ValidatedPost, PostError> {
        let mut errors = FormErrors::new();

        let text = errors.check(validate_post_text(&input.text));
        let group_id = self.resolve_group(input.group.as_deref(), &mut errors).await?;
        if let Some(upload) = input.image.as_ref() {
            if let Err(message) = inspect_image(&upload.bytes) {
                errors.add("image", message);
            }
        }

        match text {
            Some(text) if errors.is_empty() => Ok(ValidatedPost {
                text,
                group_id,
                image: input.image,
            }),
            _ => Err(PostError::Invalid(errors)),
        }
    }

    async fn resolve_group(
        &self,
        raw: Option<&str>,
        errors: &mut FormErrors,
    ) -> Result<Option<i64>, PostError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }

        let Ok(id) = raw.parse::<i64>() else {
            errors.add("group", INVALID_CHOICE);
            return Ok(None);
        };

        match self.groups.find_by_id(id).await? {
            Some(group) => Ok(Some(group.id)),
            None => {
                errors.add("group", INVALID_CHOICE);
                Ok(None)
            }
        }
    }

    async fn store_image(&self, upload: Option<&ImageUpload>) -> Result<Option<String>, PostError> {
        match upload {
            Some(upload) => Ok(Some(self.images.save(upload).await?)),
            None => Ok(None),
        }
    }

    async fn discard_image(&self, stored_path: Option<&str>) {
        let Some(path) = stored_path else {
            return;
        };
        if let Err(err) = self.images.remove(path).await {
            warn!(
                target = "yatube::application::posts",
                path,
                error = %err,
                "failed to remove stored image"
            );
        }
    }
}

/// Accept only payloads whose header decodes as a known raster format.
pub fn inspect_image(bytes: &[u8]) -> Result<(), &'static str> {
    if bytes.is_empty() {
        return Err(EMPTY_FILE);
    }
    match imagesize::blob_size(bytes) {
        Ok(size) if size.width > 0 && size.height > 0 => Ok(()),
        _ => Err(INVALID_IMAGE),
    }
}
