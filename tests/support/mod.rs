//! In-memory repositories and a router harness for integration tests.
//!
//! The store mirrors the database constraints the services rely on: unique
//! usernames, slugs and follow pairs, cascades on user and post deletion,
//! and `SET NULL` on a post's group when the group goes away.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use yatube::{
    application::{
        auth::{AuthService, SESSION_COOKIE, SignupInput},
        feed::FeedService,
        follow::FollowService,
        operator::OperatorService,
        posts::PostService,
        repos::{
            CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
            CreateSessionParams, CreateUserParams, FollowsRepo, GroupsRepo, HealthRepo,
            PageRequest, PostFilter, PostsRepo, PostsWriteRepo, RepoError, Repositories,
            SessionsRepo, UpdatePostParams, UsersRepo,
        },
    },
    cache::{CacheConfig, PageCache},
    domain::entities::{
        CommentRecord, FollowRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
    },
    infra::{
        http::{HttpState, SiteOptions, build_router},
        uploads::MediaStorage,
    },
};

pub const PASSWORD: &str = "correct-horse-battery";

#[derive(Debug, Clone)]
struct StoredPost {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    clock: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps, so creation order is publication order.
    fn tick(&mut self) -> OffsetDateTime {
        self.clock += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::days(19_000) + Duration::seconds(self.clock)
    }

    fn to_record(&self, post: &StoredPost) -> PostRecord {
        PostRecord {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            author_id: Some(post.author_id),
            author_username: self
                .users
                .iter()
                .find(|user| user.id == post.author_id)
                .map(|user| user.username.clone()),
            group: post.group_id.and_then(|group_id| {
                self.groups
                    .iter()
                    .find(|group| group.id == group_id)
                    .map(GroupRecord::summary)
            }),
            image: post.image.clone(),
        }
    }

    fn matches(&self, post: &StoredPost, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(group_id) => post.group_id == Some(group_id),
            PostFilter::Author(author_id) => post.author_id == author_id,
            PostFilter::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|follow| follow.user_id == user_id && follow.author_id == post.author_id),
        }
    }

    fn filtered(&self, filter: PostFilter) -> Vec<&StoredPost> {
        let mut posts: Vec<&StoredPost> = self
            .posts
            .iter()
            .filter(|post| self.matches(post, filter))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_group(&self, title: &str, slug: &str) -> GroupRecord {
        let mut state = self.lock();
        let group = GroupRecord {
            id: state.next_id(),
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        };
        state.groups.push(group.clone());
        group
    }

    /// Insert a post directly, bypassing validation.
    pub fn add_post(&self, author_id: i64, text: &str, group_id: Option<i64>) -> PostRecord {
        let mut state = self.lock();
        let post = StoredPost {
            id: state.next_id(),
            text: text.to_string(),
            pub_date: state.tick(),
            author_id,
            group_id,
            image: None,
        };
        state.posts.push(post.clone());
        state.to_record(&post)
    }

    pub fn post(&self, id: i64) -> Option<PostRecord> {
        let state = self.lock();
        state
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| state.to_record(post))
    }

    pub fn latest_post_id(&self) -> Option<i64> {
        self.lock().posts.iter().map(|post| post.id).max()
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn posts_by(&self, author_id: i64) -> usize {
        self.lock()
            .posts
            .iter()
            .filter(|post| post.author_id == author_id)
            .count()
    }

    pub fn comment_count(&self) -> usize {
        self.lock().comments.len()
    }

    pub fn comments_by(&self, author_id: i64) -> usize {
        self.lock()
            .comments
            .iter()
            .filter(|comment| comment.author_id == author_id)
            .count()
    }

    pub fn follow_rows(&self, user_id: i64, author_id: i64) -> usize {
        self.lock()
            .follows
            .iter()
            .filter(|follow| follow.user_id == user_id && follow.author_id == author_id)
            .count()
    }

    pub fn follow_count(&self) -> usize {
        self.lock().follows.len()
    }

    /// Push every stored session's expiry into the past.
    pub fn expire_sessions(&self) {
        let mut state = self.lock();
        for session in &mut state.sessions {
            session.expires_at = OffsetDateTime::now_utc() - Duration::minutes(1);
        }
    }
}

#[async_trait]
impl UsersRepo for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock().users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut state = self.lock();
        if state.users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: state.next_id(),
            username: params.username,
            first_name: params.first_name,
            last_name: params.last_name,
            email: params.email,
            password_hash: params.password_hash,
            date_joined: state.tick(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn delete_user(&self, username: &str) -> Result<bool, RepoError> {
        let mut state = self.lock();
        let Some(user_id) = state
            .users
            .iter()
            .find(|user| user.username == username)
            .map(|user| user.id)
        else {
            return Ok(false);
        };

        let removed_posts: Vec<i64> = state
            .posts
            .iter()
            .filter(|post| post.author_id == user_id)
            .map(|post| post.id)
            .collect();
        state.users.retain(|user| user.id != user_id);
        state.posts.retain(|post| post.author_id != user_id);
        state.comments.retain(|comment| {
            comment.author_id != user_id && !removed_posts.contains(&comment.post_id)
        });
        state
            .follows
            .retain(|follow| follow.user_id != user_id && follow.author_id != user_id);
        state.sessions.retain(|session| session.user_id != user_id);
        Ok(true)
    }
}

#[async_trait]
impl GroupsRepo for InMemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.lock().groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.lock().groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .lock()
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut state = self.lock();
        if state.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: state.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_group(&self, slug: &str) -> Result<bool, RepoError> {
        let mut state = self.lock();
        let Some(group_id) = state
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .map(|group| group.id)
        else {
            return Ok(false);
        };
        state.groups.retain(|group| group.id != group_id);
        for post in &mut state.posts {
            if post.group_id == Some(group_id) {
                post.group_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl PostsRepo for InMemoryStore {
    async fn list_posts(
        &self,
        filter: PostFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.lock();
        Ok(state
            .filtered(filter)
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|post| state.to_record(post))
            .collect())
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<u64, RepoError> {
        Ok(self.lock().filtered(filter).len() as u64)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.post(id))
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.lock();
        if !state.users.iter().any(|user| user.id == params.author_id) {
            return Err(RepoError::Integrity {
                message: "posts_author_id_fkey".to_string(),
            });
        }
        let post = StoredPost {
            id: state.next_id(),
            text: params.text,
            pub_date: state.tick(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        state.posts.push(post.clone());
        Ok(state.to_record(&post))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.lock();
        let post = state
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let post = post.clone();
        Ok(state.to_record(&post))
    }
}

#[async_trait]
impl CommentsRepo for InMemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let mut comments: Vec<CommentRecord> = self
            .lock()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.lock();
        let author_username = state
            .users
            .iter()
            .find(|user| user.id == params.author_id)
            .map(|user| user.username.clone())
            .ok_or_else(|| RepoError::Integrity {
                message: "comments_author_id_fkey".to_string(),
            })?;
        let comment = CommentRecord {
            id: state.next_id(),
            post_id: params.post_id,
            author_id: params.author_id,
            author_username,
            text: params.text,
            created: state.tick(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for InMemoryStore {
    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.lock();
        if user_id == author_id {
            return Err(RepoError::Integrity {
                message: "no_self_follow".to_string(),
            });
        }
        if state
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id)
        {
            return Ok(false);
        }
        let id = state.next_id();
        state.follows.push(FollowRecord {
            id,
            user_id,
            author_id,
        });
        Ok(true)
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut state = self.lock();
        let before = state.follows.len();
        state
            .follows
            .retain(|follow| !(follow.user_id == user_id && follow.author_id == author_id));
        Ok(state.follows.len() != before)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self
            .lock()
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id))
    }
}

#[async_trait]
impl SessionsRepo for InMemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut state = self.lock();
        let session = SessionRecord {
            id: state.next_id(),
            user_id: params.user_id,
            token_hash: params.token_hash,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|session| session.token_hash == token_hash)
            .cloned())
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<(), RepoError> {
        self.lock()
            .sessions
            .retain(|session| session.token_hash != token_hash);
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut state = self.lock();
        let before = state.sessions.len();
        state.sessions.retain(|session| !session.is_expired_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl HealthRepo for InMemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// A router over the in-memory store with a temporary media directory.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub repos: Repositories,
    pub auth: Arc<AuthService>,
    pub cache: Option<Arc<PageCache>>,
    pub media: Arc<MediaStorage>,
    _media_dir: TempDir,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    /// The session cookie value set by this response, if any.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| {
                let pair = value.split(';').next()?;
                let (name, token) = pair.split_once('=')?;
                (name == SESSION_COOKIE && !token.is_empty()).then(|| format!("{name}={token}"))
            })
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(true)
    }

    pub fn without_cache() -> Self {
        Self::build(false)
    }

    fn build(cache_enabled: bool) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let repos = Repositories::from_shared(store.clone());
        let media_dir = tempfile::tempdir().unwrap();
        let media = Arc::new(MediaStorage::new(media_dir.path().to_path_buf()).unwrap());

        let feed = FeedService::new(
            repos.posts.clone(),
            repos.groups.clone(),
            repos.users.clone(),
            repos.follows.clone(),
            repos.comments.clone(),
            10,
        );
        let posts = PostService::new(
            repos.posts.clone(),
            repos.posts_write.clone(),
            repos.groups.clone(),
            repos.comments.clone(),
            media.clone(),
        );
        let follows = FollowService::new(repos.users.clone(), repos.follows.clone());
        let auth = Arc::new(AuthService::new(
            repos.users.clone(),
            repos.sessions.clone(),
            Duration::hours(1),
        ));
        let cache = cache_enabled.then(|| Arc::new(PageCache::new(&CacheConfig::default())));

        let state = HttpState {
            feed: Arc::new(feed),
            posts: Arc::new(posts),
            follows: Arc::new(follows),
            auth: auth.clone(),
            media: media.clone(),
            health: repos.health.clone(),
            page_cache: cache.clone(),
            site: SiteOptions {
                title: "Yatube".to_string(),
                secure_cookie: false,
                max_request_bytes: 1024 * 1024,
            },
        };

        Self {
            router: build_router(state),
            store,
            repos,
            auth,
            cache,
            media,
            _media_dir: media_dir,
        }
    }

    pub fn operator(&self) -> OperatorService {
        OperatorService::new(self.repos.groups.clone(), self.repos.users.clone())
    }

    /// Create an account and return it with a ready-to-send cookie header.
    pub async fn sign_up(&self, username: &str) -> (UserRecord, String) {
        let (user, session) = self
            .auth
            .signup(SignupInput {
                first_name: String::new(),
                last_name: String::new(),
                username: username.to_string(),
                email: format!("{}@example.com", username.to_lowercase()),
                password1: PASSWORD.to_string(),
                password2: PASSWORD.to_string(),
            })
            .await
            .unwrap();
        (user, format!("{SESSION_COOKIE}={}", session.token))
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Send a multipart form. Parts are `(name, file name, bytes)`; text
    /// fields have no file name.
    pub async fn post_multipart(
        &self,
        uri: &str,
        cookie: Option<&str>,
        parts: &[(&str, Option<&str>, &[u8])],
    ) -> Response {
        const BOUNDARY: &str = "yatube-test-boundary";
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(file_name) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder().method("POST").uri(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        Response {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

/// Number of post cards in a rendered feed.
pub fn post_cards(body: &str) -> usize {
    body.matches("class=\"post-card\"").count()
}

/// A 1x1 transparent GIF.
pub const GIF_1X1: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];
