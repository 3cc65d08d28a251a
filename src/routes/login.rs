//! A route for starting the OIDC flow.

use std::collections::HashMap;

use crate::error::HttpError;
use crate::session;
use crate::ServerState;

use axum::{
    extract::{Query, State},
    http::Uri,
    response::Redirect,
};
use tower_sessions::Session;
use tracing::{error, warn};

/// A handler that sends the browser to the identity provider.
///
/// The optional `redirect` parameter names the local page to return to
/// once the login completes.
#[axum::debug_handler(state = ServerState)]
pub async fn login_handler(
    State(state): State<ServerState>,
    session: Session,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, HttpError> {
    let redirect = match params.get("redirect") {
        Some(redirect) if is_local_path(redirect) => redirect.as_str(),
        Some(redirect) => {
            warn!("ignoring non-local login redirect {:?}", redirect);
            state.config.login_redirect.as_str()
        }
        None => state.config.login_redirect.as_str(),
    };

    let (url, pending) = state.oidc.authorization_request(redirect);

    session::begin_login(&session, &pending).await.map_err(|e| {
        error!("Failed to store pending login: {}", e);
        HttpError::Internal("Failed to generate login request")
    })?;

    Ok(Redirect::to(url.as_str()))
}

/// Only same-site paths are accepted as post-login redirects: a path with
/// an optional query, no scheme or authority, and nothing a browser would
/// strip or reinterpret.
pub(crate) fn is_local_path(redirect: &str) -> bool {
    if !redirect.starts_with('/') || redirect.starts_with("//") {
        return false;
    }
    if redirect
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || c == '\\')
    {
        return false;
    }

    match redirect.parse::<Uri>() {
        Ok(uri) => uri.scheme().is_none() && uri.authority().is_none(),
        Err(_) => false,
    }
}
