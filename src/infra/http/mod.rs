mod auth;
mod follow;
mod middleware;
mod posts;
mod public;

pub use middleware::{CurrentViewer, RequestContext, SignedIn};

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, StatusCode, Uri,
        header::{CACHE_CONTROL, LOCATION},
    },
    middleware as axum_middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use url::form_urlencoded;

use crate::{
    application::{
        auth::{AuthService, Viewer},
        error::ErrorReport,
        feed::FeedService,
        follow::FollowService,
        posts::PostService,
        repos::{HealthRepo, RepoError},
    },
    cache::PageCache,
    infra::uploads::MediaStorage,
    presentation::views::LayoutChrome,
};

const LOGIN_PATH: &str = "/auth/login/";

/// Site-wide knobs the handlers need at request time.
#[derive(Debug, Clone)]
pub struct SiteOptions {
    pub title: String,
    pub secure_cookie: bool,
    pub max_request_bytes: usize,
}

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub media: Arc<MediaStorage>,
    pub health: Arc<dyn HealthRepo>,
    /// Home-feed body cache; `None` when caching is disabled.
    pub page_cache: Option<Arc<PageCache>>,
    pub site: SiteOptions,
}

impl HttpState {
    pub(crate) fn chrome(&self, viewer: Option<&Viewer>) -> LayoutChrome {
        LayoutChrome::new(self.site.title.clone(), viewer)
    }
}

pub fn build_router(state: HttpState) -> Router {
    let body_limit = state.site.max_request_bytes;
    let signed_in = axum_middleware::from_fn(middleware::require_viewer);

    Router::new()
        .route("/", get(public::index))
        .route("/group/{slug}/", get(public::group_posts))
        .route("/profile/{username}/", get(public::profile))
        .route(
            "/profile/{username}/follow/",
            get(follow::profile_redirect)
                .post(follow::profile_follow)
                .route_layer(signed_in.clone()),
        )
        .route(
            "/profile/{username}/unfollow/",
            get(follow::profile_redirect)
                .post(follow::profile_unfollow)
                .route_layer(signed_in.clone()),
        )
        .route("/follow/", get(public::follow_index))
        .route("/posts/{id}/", get(public::post_detail))
        .route(
            "/create/",
            get(posts::create_form)
                .post(posts::create_submit)
                .layer(DefaultBodyLimit::max(body_limit))
                .route_layer(signed_in.clone()),
        )
        .route(
            "/posts/{id}/edit/",
            get(posts::edit_form)
                .post(posts::edit_submit)
                .layer(DefaultBodyLimit::max(body_limit))
                .route_layer(signed_in.clone()),
        )
        .route(
            "/posts/{id}/comment/",
            get(posts::comment_redirect)
                .post(posts::add_comment)
                .route_layer(signed_in.clone()),
        )
        .route("/auth/signup/", get(auth::signup_form).post(auth::signup_submit))
        .route("/auth/login/", get(auth::login_form).post(auth::login_submit))
        .route("/auth/logout/", get(auth::logout_confirm).post(auth::logout))
        .route("/media/{*path}", get(public::serve_media))
        .route("/_health/db", get(public::db_health))
        .fallback(public::not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_viewer,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// `/auth/login/?next=<path>` for a request that needs a signed-in user.
pub(crate) fn login_redirect(uri: &Uri) -> Response {
    let next = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| uri.path());
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    Redirect::to(&format!("{LOGIN_PATH}?{query}")).into_response()
}

/// `302 Found` back to a read-only page when the viewer may not act on it.
pub(crate) fn policy_redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

pub(crate) fn profile_path(username: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(username.as_bytes()).collect();
    format!("/profile/{encoded}/")
}

pub(crate) fn post_path(post_id: i64) -> String {
    format!("/posts/{post_id}/")
}

fn set_no_store(response: &mut Response) {
    let value = HeaderValue::from_static("no-store");
    response.headers_mut().insert(CACHE_CONTROL, value);
}

/// Accept only same-site absolute paths as a post-login destination.
pub(crate) fn safe_next(next: Option<&str>) -> &str {
    match next.map(str::trim) {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') =>
        {
            path
        }
        _ => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_encodes_next() {
        let uri: Uri = "/create/".parse().unwrap();
        let response = login_redirect(&uri);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/auth/login/?next=%2Fcreate%2F"
        );
    }

    #[test]
    fn login_redirect_keeps_query() {
        let uri: Uri = "/follow/?page=2".parse().unwrap();
        let response = login_redirect(&uri);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2"
        );
    }

    #[test]
    fn policy_redirect_is_found() {
        let response = policy_redirect("/posts/7/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/posts/7/");
    }

    #[test]
    fn profile_path_escapes_username() {
        assert_eq!(profile_path("leo"), "/profile/leo/");
        assert_eq!(profile_path("a+b@c"), "/profile/a%2Bb%40c/");
    }

    #[test]
    fn safe_next_rejects_foreign_targets() {
        assert_eq!(safe_next(Some("/posts/3/")), "/posts/3/");
        assert_eq!(safe_next(Some("//evil.example/")), "/");
        assert_eq!(safe_next(Some("https://evil.example/")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }
}
