//! Gated startup.
//!
//! Each stage must succeed before the next one runs: the database is
//! connected, both tables are synchronized, and the identity provider is
//! discovered before a listening socket is opened. A failed stage leaves
//! nothing bound.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::oidc::{IdentityProvider, SetupError};
use crate::session::SessionError;
use crate::session_store::DatabaseStore;
use crate::shutdown::{Coordinator, Signal};
use crate::store::PostStore;
use crate::{app, ServerState};

use axum::Router;
use sea_orm::{Database, DbErr};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to connect to database")]
    Connect(#[source] DbErr),
    #[error("failed to synchronize schema")]
    Schema(#[source] DbErr),
    #[error("identity provider unavailable")]
    Identity(#[from] SetupError),
    #[error("invalid session settings")]
    Session(#[from] SessionError),
    #[error("failed to bind {0}")]
    Bind(SocketAddr, #[source] io::Error),
}

/// A server that passed every startup stage and is bound to its address.
#[derive(Debug)]
pub struct Ready {
    pub state: ServerState,
    router: Router,
    listener: TcpListener,
}

impl Ready {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until `stop` is notified.
    pub async fn serve(self, stop: Signal) -> io::Result<()> {
        let Self {
            state,
            router,
            listener,
        } = self;
        drop(state);

        axum::serve(listener, router)
            .with_graceful_shutdown(stop.recv())
            .await
    }
}

/// Run every startup stage in order and bind the listening socket.
pub async fn prepare(config: Config, shutdown: &Coordinator) -> Result<Ready, StartupError> {
    let db = Database::connect(config.database_url.as_str())
        .await
        .map_err(StartupError::Connect)?;
    info!("connected to database");

    let posts = PostStore::new(db.clone());
    posts.sync().await.map_err(StartupError::Schema)?;
    let sessions = DatabaseStore::new(db);
    sessions.sync().await.map_err(StartupError::Schema)?;

    let oidc = IdentityProvider::initialize(&config).await?;

    let addr = config.addr();
    let state = ServerState {
        config: Arc::new(config),
        posts,
        sessions,
        oidc: Arc::new(oidc),
        shutdown: shutdown.subscribe(),
    };
    let router = app(state.clone())?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Bind(addr, e))?;
    info!("listening on {}", addr);

    Ok(Ready {
        state,
        router,
        listener,
    })
}
