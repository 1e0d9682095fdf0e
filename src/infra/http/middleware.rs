use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::{
    auth::{SESSION_COOKIE, Viewer},
    error::ErrorReport,
};

use super::{HttpState, login_redirect};

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// The signed-in user for this request, if any.
#[derive(Debug, Clone, Default)]
pub struct CurrentViewer(pub Option<Viewer>);

impl CurrentViewer {
    pub fn get(&self) -> Option<&Viewer> {
        self.0.as_ref()
    }
}

/// The viewer of a request that passed [`require_viewer`].
#[derive(Debug, Clone)]
pub struct SignedIn(pub Viewer);

/// Send anonymous requests to the login page before any handler extractor
/// touches the body.
pub async fn require_viewer(mut request: Request<Body>, next: Next) -> Response {
    let viewer = request
        .extensions()
        .get::<CurrentViewer>()
        .and_then(|current| current.0.clone());

    match viewer {
        Some(viewer) => {
            request.extensions_mut().insert(SignedIn(viewer));
            next.run(request).await
        }
        None => login_redirect(request.uri()),
    }
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolve the session cookie into a [`CurrentViewer`]. Lookup failures are
/// logged and the request continues anonymously.
pub async fn load_viewer(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let viewer = match jar.get(SESSION_COOKIE) {
        Some(cookie) => match state.auth.resolve(cookie.value()).await {
            Ok(user) => user.as_ref().map(Viewer::from),
            Err(err) => {
                error!(
                    target = "yatube::http::session",
                    error = %err,
                    "failed to resolve session"
                );
                None
            }
        },
        None => None,
    };

    request.extensions_mut().insert(CurrentViewer(viewer));
    next.run(request).await
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}
