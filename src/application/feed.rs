use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{PageNumber, PageWindow, Paginated};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PageRequest, PostFilter, PostsRepo, RepoError,
    UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("unknown post {0}")]
    UnknownPost(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub type FeedPage = Paginated<PostRecord>;

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: FeedPage,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub post_count: u64,
    /// Whether the viewer follows the author. Always false for anonymous viewers.
    pub following: bool,
    /// Whether the viewer is the author, so no follow controls apply.
    pub is_self: bool,
    pub page: FeedPage,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
    pub author_post_count: u64,
    pub can_edit: bool,
}

/// Builds the filtered, paginated post listings behind every feed page.
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    comments: Arc<dyn CommentsRepo>,
    page_size: u32,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        comments: Arc<dyn CommentsRepo>,
        page_size: u32,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            comments,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn index(&self, page: PageNumber) -> Result<FeedPage, FeedError> {
        self.paginate(PostFilter::All, page).await
    }

    pub async fn group(&self, slug: &str, page: PageNumber) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;

        let page = self.paginate(PostFilter::Group(group.id), page).await?;
        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<i64>,
        page: PageNumber,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))?;

        let following = match viewer {
            Some(viewer_id) if viewer_id != author.id => {
                self.follows.is_following(viewer_id, author.id).await?
            }
            _ => false,
        };

        let page = self.paginate(PostFilter::Author(author.id), page).await?;
        Ok(ProfileFeed {
            post_count: page.total_items,
            following,
            is_self: viewer == Some(author.id),
            author,
            page,
        })
    }

    /// Posts by the authors `user_id` follows.
    pub async fn follow(&self, user_id: i64, page: PageNumber) -> Result<FeedPage, FeedError> {
        self.paginate(PostFilter::FollowedBy(user_id), page).await
    }

    pub async fn post_detail(
        &self,
        post_id: i64,
        viewer: Option<i64>,
    ) -> Result<PostDetail, FeedError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(FeedError::UnknownPost(post_id))?;

        let comments = self.comments.list_for_post(post.id).await?;
        let author_post_count = match post.author_id {
            Some(author_id) => self.posts.count_posts(PostFilter::Author(author_id)).await?,
            None => 0,
        };
        let can_edit = viewer.is_some_and(|viewer_id| post.is_authored_by(viewer_id));

        Ok(PostDetail {
            post,
            comments,
            author_post_count,
            can_edit,
        })
    }

    async fn paginate(&self, filter: PostFilter, page: PageNumber) -> Result<FeedPage, FeedError> {
        let total = self.posts.count_posts(filter).await?;
        let window = PageWindow::resolve(page, self.page_size, total);
        let items = if total == 0 {
            Vec::new()
        } else {
            self.posts
                .list_posts(filter, PageRequest::new(window.limit(), window.offset()))
                .await?
        };
        Ok(Paginated::new(items, window))
    }
}
