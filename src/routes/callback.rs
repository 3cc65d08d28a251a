//! A route for handling the OIDC callback.

use std::collections::HashMap;

use crate::error::HttpError;
use crate::oidc;
use crate::session;
use crate::ServerState;

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use tower_sessions::Session;
use tracing::error;

/// A handler for receiving the callback during the OIDC flow.
///
/// On success the browser is logged in under a fresh session id and sent to
/// the page recorded when the login started.
#[axum::debug_handler(state = ServerState)]
pub async fn callback_handler(
    State(state): State<ServerState>,
    session: Session,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, HttpError> {
    if let Some(err) = params.get("error") {
        error!(
            "identity provider returned {}: {}",
            err,
            params
                .get("error_description")
                .map(String::as_str)
                .unwrap_or("no description")
        );
        return Err(HttpError::BadRequest("Login failed"));
    }

    let code = params
        .get("code")
        .ok_or(HttpError::BadRequest("No code parameter provided"))?;
    let state_param = params
        .get("state")
        .ok_or(HttpError::BadRequest("No state parameter provided"))?;

    let pending = session::take_pending_login(&session)
        .await
        .map_err(|e| {
            error!("Failed to read pending login: {}", e);
            HttpError::Internal("Failed to read session")
        })?
        .ok_or(HttpError::BadRequest("No login in progress"))?;

    pending.verify_state(state_param).map_err(|e| {
        error!("Rejected callback: {}", e);
        match e {
            oidc::Error::Expired => HttpError::BadRequest("Login request expired"),
            _ => HttpError::BadRequest("CSRF checking failed"),
        }
    })?;

    let user = state
        .oidc
        .complete(code.clone(), &pending)
        .await
        .map_err(|_| HttpError::BadRequest("Login failed"))?;

    session::login(&session, user).await.map_err(|e| {
        error!("Failed to start session: {}", e);
        HttpError::Internal("Failed to start session")
    })?;

    Ok(Redirect::to(pending.get_redirect()))
}

#[cfg(test)]
mod tests {
    use crate::routes::CALLBACK_PATH;
    use crate::test_support::{app, json_body, location, request, set_cookie, state};
    use crate::ServerState;

    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Start a login, returning the session cookie and the CSRF token the
    /// provider would echo back.
    async fn start_login(state: &ServerState, uri: &str) -> (String, String) {
        let response = app(state.clone())
            .oneshot(request("GET", uri, None, None))
            .await
            .expect("response");

        let cookie = set_cookie(&response, &state.config.cookie_name).expect("session cookie");
        let url = openidconnect::url::Url::parse(location(&response)).expect("provider url");
        let csrf = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state parameter");

        (cookie, csrf)
    }

    async fn callback(
        state: &ServerState,
        query: &str,
        cookie: Option<&str>,
    ) -> axum::response::Response {
        app(state.clone())
            .oneshot(request(
                "GET",
                &format!("{}?{}", CALLBACK_PATH, query),
                cookie,
                None,
            ))
            .await
            .expect("response")
    }

    async fn rejected(response: axum::response::Response) -> Value {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        json_body(response).await
    }

    #[tokio::test]
    async fn successful_login() {
        let state = state().await;
        let (cookie, csrf) = start_login(&state, "/login?redirect=%2Fadmin%3Ftab%3Dposts").await;

        let query = format!("code=valid-code&state={}", csrf);
        let response = callback(&state, &query, Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/admin?tab=posts");
        let session_cookie =
            set_cookie(&response, &state.config.cookie_name).expect("new session cookie");
        assert_ne!(session_cookie, cookie);
        assert_eq!(state.sessions.count().await, 1);

        // the new session opens the admin page
        let response = app(state.clone())
            .oneshot(request("GET", "/admin", Some(&session_cookie), None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        // the pending login was consumed
        let response = callback(&state, &query, Some(&session_cookie)).await;
        assert_eq!(
            rejected(response).await,
            json!({ "message": "No login in progress" })
        );
    }

    #[tokio::test]
    async fn unsafe_redirects_fall_back_to_admin() {
        for redirect in [
            "https%3A%2F%2Fevil.example.com",
            "%2F%2Fevil.example.com",
            "%2F%09%2Fevil.example.com",
            "%2F%0A%2Fevil",
        ] {
            let state = state().await;
            let (cookie, csrf) = start_login(&state, &format!("/login?redirect={}", redirect)).await;

            let query = format!("code=valid-code&state={}", csrf);
            let response = callback(&state, &query, Some(&cookie)).await;

            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", redirect);
            assert_eq!(location(&response), "/admin", "{}", redirect);
        }
    }

    #[tokio::test]
    async fn provider_errors_are_reported() {
        let state = state().await;

        let response = callback(&state, "error=access_denied&error_description=nope", None).await;

        assert_eq!(rejected(response).await, json!({ "message": "Login failed" }));
    }

    #[tokio::test]
    async fn missing_pending_login() {
        let state = state().await;

        let response = callback(&state, "code=valid-code&state=xyz", None).await;

        assert_eq!(
            rejected(response).await,
            json!({ "message": "No login in progress" })
        );
        assert_eq!(state.sessions.count().await, 0);
    }

    #[tokio::test]
    async fn forged_state_is_rejected() {
        let state = state().await;
        let (cookie, _) = start_login(&state, "/login").await;

        let response = callback(&state, "code=valid-code&state=forged", Some(&cookie)).await;

        assert_eq!(
            rejected(response).await,
            json!({ "message": "CSRF checking failed" })
        );

        // nobody was logged in
        let response = app(state.clone())
            .oneshot(request("GET", "/admin", Some(&cookie), None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn failed_exchange_is_rejected() {
        let state = state().await;
        let (cookie, csrf) = start_login(&state, "/login").await;

        let query = format!("code=wrong-code&state={}", csrf);
        let response = callback(&state, &query, Some(&cookie)).await;

        assert_eq!(rejected(response).await, json!({ "message": "Login failed" }));
    }

    #[tokio::test]
    async fn missing_code() {
        let state = state().await;
        let (cookie, csrf) = start_login(&state, "/login").await;

        let response = callback(&state, &format!("state={}", csrf), Some(&cookie)).await;

        assert_eq!(
            rejected(response).await,
            json!({ "message": "No code parameter provided" })
        );
    }
}
