//! # postern
//!
//! postern is a small blog backend guarded by OpenID Connect.
//!
//! ## About
//!
//! Users log in through an external identity provider using the
//! authorization code flow. Once logged in, a browser session unlocks the
//! admin page and a JSON API for creating, reading, updating, and deleting
//! posts. Every request to the API passes through one authentication gate,
//! which answers `401 {"message":"Unauthorized"}` to anyone without a
//! session.

pub mod config;
pub mod entity;
pub mod error;
pub mod oidc;
pub mod routes;
pub mod session;
pub mod session_store;
pub mod shutdown;
pub mod startup;
pub mod store;

pub use routes::app;

use std::sync::Arc;

use axum::extract::FromRef;

#[derive(Debug, Clone, FromRef)]
pub struct ServerState {
    pub config: Arc<crate::config::Config>,
    pub posts: crate::store::PostStore,
    pub sessions: crate::session_store::DatabaseStore,
    pub oidc: Arc<dyn crate::oidc::Authenticator>,

    // Signals back to the main thread when dropped
    pub shutdown: crate::shutdown::Signal,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::{
        config::Config, oidc, session, session_store::DatabaseStore, shutdown, store, ServerState,
    };

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, Response},
        Router,
    };
    use serde_json::{json, Value};
    use time::{Duration, OffsetDateTime};
    use tower_sessions::{
        cookie::{Cookie, CookieJar},
        session::{Id, Record},
        SessionStore,
    };

    pub fn config() -> Config {
        config_with(&[])
    }

    /// The test configuration with some variables replaced.
    pub fn config_with(overrides: &[(&str, &str)]) -> Config {
        let mut vars: HashMap<String, String> = [
            ("SESSION_SECRET", "test secret"),
            ("ISSUER", "https://idp.example.com"),
            ("CLIENT_ID", "postern"),
            ("CLIENT_SECRET", "client secret"),
            (
                "REDIRECT_URL",
                "http://localhost:3000/authorization-code/callback",
            ),
            ("COOKIE_SECURE", "false"),
            ("PUBLIC_DIR", concat!(env!("CARGO_MANIFEST_DIR"), "/public")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        vars.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        Config::try_from_iter(vars).expect("test config")
    }

    pub async fn state() -> ServerState {
        let sessions = DatabaseStore::new(store::memory_database().await);
        sessions.sync().await.expect("sync sessions");

        ServerState {
            config: Arc::new(config()),
            posts: store::memory_store().await,
            sessions,
            oidc: Arc::new(oidc::TestAuthenticator(oidc::test_provider())),
            shutdown: shutdown::Coordinator::new().subscribe(),
        }
    }

    pub fn app(state: ServerState) -> Router {
        crate::app(state).expect("build app")
    }

    /// A signed `Cookie` header value naming the session `id`.
    pub fn session_cookie(state: &ServerState, id: Id) -> String {
        let key = session::cookie_key(&state.config.session_secret).expect("cookie key");
        let name = state.config.cookie_name.clone();

        let mut jar = CookieJar::new();
        jar.signed_mut(&key)
            .add(Cookie::new(name.clone(), id.to_string()));
        let signed = jar.get(&name).expect("signed cookie");

        format!("{}={}", name, signed.value())
    }

    /// A `Cookie` header value for a freshly logged in user.
    pub async fn login(state: &ServerState) -> String {
        let mut record = Record {
            id: Id::default(),
            data: HashMap::from([(
                session::USER_KEY.to_string(),
                json!(session::test_user()),
            )]),
            expiry_date: OffsetDateTime::now_utc() + Duration::hours(1),
        };
        state
            .sessions
            .create(&mut record)
            .await
            .expect("create session");

        session_cookie(state, record.id)
    }

    /// The `name=value` pair of a cookie the response asked the browser to
    /// set.
    pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
        let prefix = format!("{}=", name);

        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(&prefix))
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
    }

    pub fn request(
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request")
    }

    pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body")
            .to_vec()
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    pub fn location(response: &Response<Body>) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("location header")
    }
}
