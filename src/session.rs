//! Browser sessions.
//!
//! Sessions are managed by `tower-sessions`: the browser holds a signed
//! cookie naming a record in the [`DatabaseStore`], and the record carries
//! the logged in [`User`] and any login still in progress. Flushing the
//! session on logout deletes the record, so every copy of the cookie stops
//! working.

use crate::config::Config;
use crate::oidc::OidcState;
use crate::session_store::DatabaseStore;

use axum::response::Redirect;
use blake2::{Blake2b512, Digest};
use openidconnect::url::form_urlencoded::byte_serialize;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Duration;
use tower_sessions::{
    cookie::{Key, SameSite},
    service::SignedCookie,
    Expiry, Session, SessionManagerLayer,
};
use tracing::{error, info};

pub(crate) const USER_KEY: &str = "user";
const PENDING_KEY: &str = "pending_login";

const DOMAIN_COOKIE_KEY: &[u8] = b"postern-session-cookie-key";

const MAX_SESSION_TTL: u64 = 366 * 24 * 60 * 60;

/// Errors while reading or changing a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session secret must not be empty")]
    EmptySecret,
    #[error("derived cookie key is unusable")]
    InvalidKey,
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// The identity of a logged in user, as reported by the identity provider.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct User {
    pub subject: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub preferred_username: Option<String>,
}

/// Stretch the configured secret into the key signing session cookies.
pub fn cookie_key(secret: &str) -> Result<Key, SessionError> {
    if secret.is_empty() {
        return Err(SessionError::EmptySecret);
    }

    let hash = Blake2b512::new()
        .chain_update(DOMAIN_COOKIE_KEY)
        .chain_update(secret.as_bytes())
        .finalize();

    Key::try_from(hash.as_slice()).map_err(|_| SessionError::InvalidKey)
}

/// The session middleware, configured from the cookie settings.
pub fn layer(
    store: DatabaseStore,
    config: &Config,
) -> Result<SessionManagerLayer<DatabaseStore, SignedCookie>, SessionError> {
    let ttl = Duration::seconds(config.session_ttl.min(MAX_SESSION_TTL) as i64);

    Ok(SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_path("/")
        .with_http_only(true)
        .with_secure(config.cookie_secure)
        // the callback is a cross-site navigation from the provider
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(ttl))
        .with_signed(cookie_key(&config.session_secret)?))
}

/// The user logged in to this session, if any.
pub async fn current_user(session: &Session) -> Result<Option<User>, SessionError> {
    Ok(session.get(USER_KEY).await?)
}

/// Allow an authenticated session through, or produce a redirect to the
/// login flow that returns to `return_to` afterwards.
pub async fn require_authentication(
    session: &Session,
    return_to: &str,
) -> Result<User, Redirect> {
    match current_user(session).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(login_redirect(return_to)),
        Err(e) => {
            error!("failed to read session: {}", e);
            Err(login_redirect(return_to))
        }
    }
}

fn login_redirect(return_to: &str) -> Redirect {
    let return_to: String = byte_serialize(return_to.as_bytes()).collect();
    Redirect::to(&format!("/login?redirect={}", return_to))
}

/// Remember a login that has been sent to the identity provider.
pub async fn begin_login(session: &Session, pending: &OidcState) -> Result<(), SessionError> {
    Ok(session.insert(PENDING_KEY, pending).await?)
}

/// Take the login in progress out of the session. It can only be completed
/// once.
pub async fn take_pending_login(session: &Session) -> Result<Option<OidcState>, SessionError> {
    Ok(session.remove(PENDING_KEY).await?)
}

/// Log `user` in under a fresh session id.
pub async fn login(session: &Session, user: User) -> Result<(), SessionError> {
    session.cycle_id().await?;
    session.insert(USER_KEY, &user).await?;

    info!("started session for {}", user.subject);
    Ok(())
}

/// Destroy the session record and clear its cookie.
pub async fn logout(session: &Session) -> Result<(), SessionError> {
    if let Some(user) = current_user(session).await? {
        info!("ended session for {}", user.subject);
    }

    Ok(session.flush().await?)
}

#[cfg(test)]
pub(crate) fn test_user() -> User {
    User {
        subject: "00u1example".to_string(),
        name: Some("Example User".to_string()),
        email: Some("user@example.com".to_string()),
        preferred_username: None,
    }
}
