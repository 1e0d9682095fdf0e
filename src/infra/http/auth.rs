use axum::{
    Form,
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::{
    application::{
        auth::{AuthError, IssuedSession, SESSION_COOKIE, SignupInput},
        error::HttpError,
        forms::FormErrors,
    },
    presentation::views::{
        FieldView, LayoutChrome, LayoutContext, LoggedOutTemplate, LoginTemplate, LoginView,
        LogoutConfirmTemplate,
        SignupTemplate, SignupView, render_template_response,
    },
};

use super::{CurrentViewer, HttpState, safe_next, set_no_store};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    username: String,
    password: String,
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SignupForm {
    first_name: String,
    last_name: String,
    username: String,
    email: String,
    password1: String,
    password2: String,
}

impl From<SignupForm> for SignupInput {
    fn from(form: SignupForm) -> Self {
        Self {
            first_name: form.first_name,
            last_name: form.last_name,
            username: form.username,
            email: form.email,
            password1: form.password1,
            password2: form.password2,
        }
    }
}

pub(super) async fn login_form(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let chrome = state.chrome(viewer.get());
    let next = safe_next(query.next.as_deref()).to_string();
    render_login(chrome, "", next, &FormErrors::new())
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next(form.next.as_deref()).to_string();

    match state.auth.login(&form.username, &form.password).await {
        Ok((_, session)) => {
            let jar = jar.add(session_cookie(&state, &session));
            (jar, Redirect::to(&next)).into_response()
        }
        Err(AuthError::Invalid(errors)) => {
            render_login(state.chrome(viewer.get()), &form.username, next, &errors)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn signup_form(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
) -> Response {
    let chrome = state.chrome(viewer.get());
    render_signup(chrome, &SignupForm::default(), &FormErrors::new())
}

pub(super) async fn signup_submit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    let submitted = SignupForm {
        password1: String::new(),
        password2: String::new(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        username: form.username.clone(),
        email: form.email.clone(),
    };

    match state.auth.signup(form.into()).await {
        Ok((_, session)) => {
            let jar = jar.add(session_cookie(&state, &session));
            (jar, Redirect::to("/")).into_response()
        }
        Err(AuthError::Invalid(errors)) => {
            render_signup(state.chrome(viewer.get()), &submitted, &errors)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// `GET` only asks for confirmation; the session ends on `POST`.
pub(super) async fn logout_confirm(
    State(state): State<HttpState>,
    Extension(viewer): Extension<CurrentViewer>,
) -> Response {
    let view = LayoutContext::new(state.chrome(viewer.get()).with_title("Log out"), ());
    let mut response = render_template_response(LogoutConfirmTemplate { view }, StatusCode::OK);
    set_no_store(&mut response);
    response
}

/// Ends the session if there is one; the page renders either way.
pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(err) = state.auth.logout(cookie.value()).await {
            return HttpError::from(err).into_response();
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    let view = LayoutContext::new(state.chrome(None).with_title("Logged out"), ());
    let mut response = render_template_response(LoggedOutTemplate { view }, StatusCode::OK);
    set_no_store(&mut response);
    (jar, response).into_response()
}

fn session_cookie(state: &HttpState, session: &IssuedSession) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.site.secure_cookie)
        .max_age(state.auth.session_ttl())
        .build()
}

fn render_login(
    chrome: LayoutChrome,
    username: &str,
    next: String,
    errors: &FormErrors,
) -> Response {
    let content = LoginView {
        username: FieldView::new(username, errors, "username"),
        next,
        non_field_errors: errors.non_field().to_vec(),
    };
    let view = LayoutContext::new(chrome.with_title("Log in"), content);
    let mut response = render_template_response(LoginTemplate { view }, StatusCode::OK);
    set_no_store(&mut response);
    response
}

fn render_signup(chrome: LayoutChrome, form: &SignupForm, errors: &FormErrors) -> Response {
    let content = SignupView {
        first_name: FieldView::new(form.first_name.as_str(), errors, "first_name"),
        last_name: FieldView::new(form.last_name.as_str(), errors, "last_name"),
        username: FieldView::new(form.username.as_str(), errors, "username"),
        email: FieldView::new(form.email.as_str(), errors, "email"),
        password1_errors: errors.for_field("password1").to_vec(),
        password2_errors: errors.for_field("password2").to_vec(),
        non_field_errors: errors.non_field().to_vec(),
    };
    let view = LayoutContext::new(chrome.with_title("Sign up"), content);
    let mut response = render_template_response(SignupTemplate { view }, StatusCode::OK);
    set_no_store(&mut response);
    response
}
