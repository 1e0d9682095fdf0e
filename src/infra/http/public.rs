use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::{Extension, OriginalUri, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        feed::FeedError,
        pagination::PageNumber,
    },
    infra::uploads::MediaStorageError,
    presentation::views::{
        FeedBodyTemplate, FeedPageView, FieldView, FollowTemplate, GroupPageView, GroupTemplate,
        IndexTemplate, LayoutChrome, LayoutContext, PostCard, PostDetailTemplate, PostDetailView,
        ProfilePageView, ProfileTemplate, render_fragment, render_not_found_response,
        render_template_response,
    },
};

use super::{CurrentViewer, HttpState, db_health_response, login_redirect};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn page(&self) -> PageNumber {
        PageNumber::parse(self.page.as_deref())
    }
}

/// Key of a cached home-feed body.
pub(crate) fn index_cache_key(page: PageNumber) -> String {
    format!("/?page={}", page.get())
}

pub(super) async fn index(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = state.chrome(viewer.get());
    let page = query.page();

    let feed = &state.feed;
    let render = move || async move {
        let page = feed.index(page).await?;
        render_fragment(&FeedBodyTemplate::from_page(&page, true)).map_err(HttpError::from)
    };
    let body = match &state.page_cache {
        Some(cache) => cache.get_or_render(&index_cache_key(page), render).await,
        None => render().await,
    };

    match body {
        Ok(body_html) => {
            let content = FeedPageView {
                heading: "Latest posts".to_string(),
                body_html,
            };
            let view = LayoutContext::new(chrome, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => err.into_response(),
    }
}

pub(super) async fn group_posts(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = state.chrome(viewer.get());

    let feed = match state.feed.group(&slug, query.page()).await {
        Ok(feed) => feed,
        Err(err) => return feed_error_to_response(err, chrome),
    };
    let body_html = match render_fragment(&FeedBodyTemplate::from_page(&feed.page, false)) {
        Ok(body) => body,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let chrome = chrome.with_title(&feed.group.title);
    let view = LayoutContext::new(chrome, GroupPageView::new(&feed.group, body_html));
    render_template_response(GroupTemplate { view }, StatusCode::OK)
}

pub(super) async fn profile(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = state.chrome(viewer.get());
    let viewer_id = viewer.get().map(|viewer| viewer.id);

    let feed = match state.feed.profile(&username, viewer_id, query.page()).await {
        Ok(feed) => feed,
        Err(err) => return feed_error_to_response(err, chrome),
    };
    let body_html = match render_fragment(&FeedBodyTemplate::from_page(&feed.page, true)) {
        Ok(body) => body,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let show_follow_controls = viewer_id.is_some() && !feed.is_self;
    let content = ProfilePageView::new(
        &feed.author,
        feed.post_count,
        feed.following,
        show_follow_controls,
        body_html,
    );
    let chrome = chrome.with_title(format!("Profile of {}", feed.author.display_name()));
    let view = LayoutContext::new(chrome, content);
    render_template_response(ProfileTemplate { view }, StatusCode::OK)
}

pub(super) async fn follow_index(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<PageQuery>,
) -> Response {
    let Some(current) = viewer.get() else {
        return login_redirect(&uri);
    };
    let chrome = state.chrome(Some(current));

    let feed = match state.feed.follow(current.id, query.page()).await {
        Ok(feed) => feed,
        Err(err) => return feed_error_to_response(err, chrome),
    };
    let body_html = match render_fragment(&FeedBodyTemplate::from_page(&feed, true)) {
        Ok(body) => body,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let content = FeedPageView {
        heading: "Posts from authors you follow".to_string(),
        body_html,
    };
    let view = LayoutContext::new(chrome.with_title("Following"), content);
    render_template_response(FollowTemplate { view }, StatusCode::OK)
}

pub(super) async fn post_detail(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = state.chrome(viewer.get());
    let Ok(post_id) = raw_id.parse::<i64>() else {
        return render_not_found_response(chrome);
    };

    let viewer_id = viewer.get().map(|viewer| viewer.id);
    let comment_form = viewer_id.map(|_| FieldView::default());
    render_post_detail(&state, chrome, post_id, viewer_id, comment_form).await
}

/// The detail page, optionally with a comment form carrying submitted text
/// and errors.
pub(super) async fn render_post_detail(
    state: &HttpState,
    chrome: LayoutChrome,
    post_id: i64,
    viewer_id: Option<i64>,
    comment_form: Option<FieldView>,
) -> Response {
    let detail = match state.feed.post_detail(post_id, viewer_id).await {
        Ok(detail) => detail,
        Err(err) => return feed_error_to_response(err, chrome),
    };

    let content = PostDetailView {
        post: PostCard::from(&detail.post),
        author_post_count: detail.author_post_count,
        can_edit: detail.can_edit,
        comments: detail.comments.iter().map(Into::into).collect(),
        comment_form,
    };
    let chrome = chrome.with_title(detail.post.preview());
    let view = LayoutContext::new(chrome, content);
    render_template_response(PostDetailTemplate { view }, StatusCode::OK)
}

pub(super) async fn serve_media(
    State(state): State<HttpState>,
    Path(path): Path<String>,
) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(MediaStorageError::InvalidPath) => media_not_found(SOURCE),
        Err(MediaStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            media_not_found(SOURCE)
        }
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::internal(SOURCE, &err).into_response()
        }
    }
}

pub(super) async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.health_check().await)
}

pub(super) async fn not_found(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
) -> Response {
    render_not_found_response(state.chrome(viewer.get()))
}

pub(super) fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    match err {
        FeedError::UnknownGroup(_) | FeedError::UnknownAuthor(_) | FeedError::UnknownPost(_) => {
            let mut response = render_not_found_response(chrome);
            ErrorReport::from_error(
                "infra::http::feed_error_to_response",
                StatusCode::NOT_FOUND,
                &err,
            )
            .attach(&mut response);
            response
        }
        err => HttpError::from(err).into_response(),
    }
}

fn media_not_found(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Media not found",
        "The requested media file is not available",
    )
    .into_response()
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    response
}
