//! The home and admin pages.
//!
//! Both documents are compiled into the binary, so the admin page is only
//! reachable through its gated route and never through the public
//! directory.

use super::gate::require_login;
use crate::session;
use crate::ServerState;

use axum::{
    middleware,
    response::{Html, Redirect},
    routing::{get, Router},
};
use tower_sessions::Session;
use tracing::error;

const HOME_PAGE: &str = include_str!("../../pages/home.html");
const ADMIN_PAGE: &str = include_str!("../../pages/admin.html");

pub fn routes() -> Router<ServerState> {
    let admin = Router::new()
        .route("/admin", get(admin_handler))
        .route_layer(middleware::from_fn(require_login));

    Router::new()
        .route("/", get(root_handler))
        .route("/home", get(home_handler))
        .route("/logout", get(logout_handler))
        .merge(admin)
}

#[axum::debug_handler(state = ServerState)]
async fn root_handler() -> Redirect {
    Redirect::to("/home")
}

#[axum::debug_handler(state = ServerState)]
async fn home_handler() -> Html<&'static str> {
    Html(HOME_PAGE)
}

#[axum::debug_handler(state = ServerState)]
async fn admin_handler() -> Html<&'static str> {
    Html(ADMIN_PAGE)
}

/// End the session, if any, and go back home.
#[axum::debug_handler(state = ServerState)]
async fn logout_handler(session: Session) -> Redirect {
    if let Err(e) = session::logout(&session).await {
        error!("failed to end session: {}", e);
    }

    Redirect::to("/home")
}
