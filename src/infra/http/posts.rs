use axum::{
    Form,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use tracing::warn;

use crate::{
    application::{
        error::HttpError,
        forms::FormErrors,
        posts::{ImageUpload, PostError, PostInput},
    },
    domain::entities::PostRecord,
    presentation::views::{
        FieldView, LayoutChrome, LayoutContext, PostFormTemplate, PostFormView,
        render_not_found_response, render_template_response,
    },
};

use super::{
    HttpState, SignedIn, policy_redirect, post_path, profile_path, public::render_post_detail,
    set_no_store,
};

const SOURCE: &str = "infra::http::posts";

pub(super) async fn create_form(
    State(state): State<HttpState>,
    Extension(SignedIn(current)): Extension<SignedIn>,
) -> Response {
    let chrome = state.chrome(Some(&current));
    let input = PostInput::default();
    render_post_form(&state, chrome, "/create/", false, &input, None, &FormErrors::new()).await
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    Extension(SignedIn(current)): Extension<SignedIn>,
    mut multipart: Multipart,
) -> Response {
    let input = match read_post_form(&mut multipart).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.create(current.id, input.clone()).await {
        Ok(_) => Redirect::to(&profile_path(&current.username)).into_response(),
        Err(PostError::Invalid(errors)) => {
            let chrome = state.chrome(Some(&current));
            render_post_form(&state, chrome, "/create/", false, &input, None, &errors).await
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn edit_form(
    State(state): State<HttpState>,
    Extension(SignedIn(current)): Extension<SignedIn>,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = state.chrome(Some(&current));
    let Ok(post_id) = raw_id.parse::<i64>() else {
        return render_not_found_response(chrome);
    };

    let post = match state.posts.editable(post_id, current.id).await {
        Ok(post) => post,
        Err(err) => return edit_refusal(err, chrome, post_id),
    };

    let input = PostInput {
        text: post.text.clone(),
        group: post.group.as_ref().map(|group| group.id.to_string()),
        image: None,
    };
    let action = edit_path(post.id);
    render_post_form(&state, chrome, &action, true, &input, Some(&post), &FormErrors::new()).await
}

pub(super) async fn edit_submit(
    State(state): State<HttpState>,
    Extension(SignedIn(current)): Extension<SignedIn>,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let chrome = state.chrome(Some(&current));
    let Ok(post_id) = raw_id.parse::<i64>() else {
        return render_not_found_response(chrome);
    };

    let post = match state.posts.editable(post_id, current.id).await {
        Ok(post) => post,
        Err(err) => return edit_refusal(err, chrome, post_id),
    };
    let input = match read_post_form(&mut multipart).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.update(post.id, current.id, input.clone()).await {
        Ok(updated) => Redirect::to(&post_path(updated.id)).into_response(),
        Err(PostError::Invalid(errors)) => {
            let action = edit_path(post.id);
            render_post_form(&state, chrome, &action, true, &input, Some(&post), &errors).await
        }
        Err(err) => edit_refusal(err, chrome, post_id),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    text: String,
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    Extension(SignedIn(current)): Extension<SignedIn>,
    Path(raw_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let chrome = state.chrome(Some(&current));
    let Ok(post_id) = raw_id.parse::<i64>() else {
        return render_not_found_response(chrome);
    };

    match state.posts.add_comment(post_id, current.id, &form.text).await {
        Ok(_) => Redirect::to(&post_path(post_id)).into_response(),
        Err(PostError::Invalid(errors)) => {
            let comment_form = FieldView::new(form.text, &errors, "text");
            render_post_detail(&state, chrome, post_id, Some(current.id), Some(comment_form))
                .await
        }
        Err(PostError::UnknownPost(_)) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// `GET` on the comment endpoint just leads back to the post.
pub(super) async fn comment_redirect(Path(raw_id): Path<String>) -> Response {
    match raw_id.parse::<i64>() {
        Ok(post_id) => Redirect::to(&post_path(post_id)).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Non-authors are sent to the read-only page; unknown posts get the 404 page.
fn edit_refusal(err: PostError, chrome: LayoutChrome, post_id: i64) -> Response {
    match err {
        PostError::NotAuthor { .. } => policy_redirect(&post_path(post_id)),
        PostError::UnknownPost(_) => render_not_found_response(chrome),
        err => HttpError::from(err).into_response(),
    }
}

fn edit_path(post_id: i64) -> String {
    format!("/posts/{post_id}/edit/")
}

async fn render_post_form(
    state: &HttpState,
    chrome: LayoutChrome,
    action: &str,
    is_edit: bool,
    input: &PostInput,
    post: Option<&PostRecord>,
    errors: &FormErrors,
) -> Response {
    let groups = match state.posts.groups().await {
        Ok(groups) => groups,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let content = PostFormView::new(
        action,
        is_edit,
        &input.text,
        input.group.as_deref(),
        &groups,
        post.and_then(|post| post.image.as_deref()),
        errors,
    );
    let title = if is_edit { "Edit post" } else { "New post" };
    let view = LayoutContext::new(chrome.with_title(title), content);
    let mut response = render_template_response(PostFormTemplate { view }, StatusCode::OK);
    set_no_store(&mut response);
    response
}

/// Collect `text`, `group` and `image` from a multipart post form. A file
/// input left empty arrives as a nameless, empty part and is ignored.
async fn read_post_form(multipart: &mut Multipart) -> Result<PostInput, HttpError> {
    let mut input = PostInput::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                warn!(
                    target = SOURCE,
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                let public_message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "Request body too large"
                } else {
                    "Invalid form data"
                };
                return Err(HttpError::from_error(SOURCE, status, public_message, &err));
            }
        };

        match field.name() {
            Some("text") => {
                input.text = field.text().await.map_err(|err| {
                    HttpError::from_error(SOURCE, err.status(), "Invalid form data", &err)
                })?;
            }
            Some("group") => {
                let value = field.text().await.map_err(|err| {
                    HttpError::from_error(SOURCE, err.status(), "Invalid form data", &err)
                })?;
                input.group = Some(value);
            }
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    HttpError::from_error(SOURCE, err.status(), "Invalid form data", &err)
                })?;
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                input.image = Some(ImageUpload { file_name, bytes });
            }
            _ => continue,
        }
    }

    Ok(input)
}
