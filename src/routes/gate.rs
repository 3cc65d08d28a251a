//! Authentication gates placed in front of protected routes.

use crate::error::HttpError;
use crate::session;

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use tracing::error;

/// Let authenticated requests through to the wrapped routes and answer
/// everything else with 401. The wrapped handler never runs for a rejected
/// request.
pub async fn require_session(session: Session, request: Request, next: Next) -> Response {
    match session::current_user(&session).await {
        Ok(Some(_)) => next.run(request).await,
        Ok(None) => HttpError::Unauthorized.into_response(),
        Err(e) => {
            error!("failed to read session: {}", e);
            HttpError::Internal("Internal Server Error").into_response()
        }
    }
}

/// Let authenticated requests through to the wrapped routes and send
/// everything else to the login flow, returning to the requested page
/// afterwards.
pub async fn require_login(session: Session, request: Request, next: Next) -> Response {
    let return_to = request
        .uri()
        .path_and_query()
        .map(|path| path.as_str())
        .unwrap_or("/");

    match session::require_authentication(&session, return_to).await {
        Ok(_) => next.run(request).await,
        Err(redirect) => redirect.into_response(),
    }
}
