use axum::{
    extract::{Extension, Path, State},
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    application::{error::HttpError, follow::FollowError},
    presentation::views::render_not_found_response,
};

use super::{HttpState, SignedIn, profile_path};

pub(super) async fn profile_follow(
    State(state): State<HttpState>,
    Extension(SignedIn(current)): Extension<SignedIn>,
    Path(username): Path<String>,
) -> Response {
    match state.follows.follow(current.id, &username).await {
        Ok(_) => Redirect::to(&profile_path(&username)).into_response(),
        Err(FollowError::UnknownAuthor(_)) => {
            render_not_found_response(state.chrome(Some(&current)))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn profile_unfollow(
    State(state): State<HttpState>,
    Extension(SignedIn(current)): Extension<SignedIn>,
    Path(username): Path<String>,
) -> Response {
    match state.follows.unfollow(current.id, &username).await {
        Ok(_) => Redirect::to(&profile_path(&username)).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Follow links opened with `GET` (for example after logging in) land on the
/// profile without changing anything.
pub(super) async fn profile_redirect(Path(username): Path<String>) -> Response {
    Redirect::to(&profile_path(&username)).into_response()
}
