mod callback;
mod gate;
mod login;
mod pages;
mod posts;

use crate::session::{self, SessionError};
use crate::ServerState;
use callback::callback_handler;
use login::login_handler;

use axum::{
    http::StatusCode,
    routing::{get, Router},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;

/// Path the identity provider redirects back to after a login.
pub const CALLBACK_PATH: &str = "/authorization-code/callback";

pub fn routes(state: &ServerState) -> Router<ServerState> {
    Router::new()
        .route("/login", get(login_handler))
        .route(CALLBACK_PATH, get(callback_handler))
        .route("/ping", get(ping_handler))
        .merge(pages::routes())
        .merge(posts::routes())
        .fallback_service(ServeDir::new(&state.config.public_dir))
}

/// Build the complete application: every route plus tracing, CORS, and
/// sessions.
pub fn app(state: ServerState) -> Result<Router, SessionError> {
    let sessions = session::layer(state.sessions.clone(), &state.config)?;

    Ok(routes(&state).with_state(state).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(LatencyUnit::Micros),
                    ),
            )
            .layer(CorsLayer::permissive())
            .layer(sessions),
    ))
}

#[axum::debug_handler(state = ServerState)]
async fn ping_handler() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use crate::test_support::{app, body_bytes, request, state};

    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn ping() {
        let response = app(state().await)
            .oneshot(request("GET", "/ping", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn static_files_are_public() {
        let response = app(state().await)
            .oneshot(request("GET", "/style.css", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_document_is_not_a_static_file() {
        let response = app(state().await)
            .oneshot(request("GET", "/admin.html", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = String::from_utf8(body_bytes(response).await).expect("utf-8");
        assert!(!body.contains("<title>Admin</title>"));
    }
}
