use std::env::var;
use std::process::ExitCode;
use std::time::Duration;

use postern::{config::Config, shutdown::Coordinator, startup};

use anyhow::Context;
use tracing::{error, info};

/// How often expired sessions are purged from the database.
const SESSION_CLEANUP_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env file is fine, the environment may already be set
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::try_env().context("invalid configuration")?;

    let coordinator = Coordinator::new();
    let ready = startup::prepare(config, &coordinator)
        .await
        .context("startup failed")?;

    let posts = ready.state.posts.clone();
    tokio::spawn(
        ready
            .state
            .sessions
            .clone()
            .delete_expired_until(SESSION_CLEANUP_PERIOD, coordinator.subscribe()),
    );

    let mut server = tokio::spawn(ready.serve(coordinator.subscribe()));

    tokio::select! {
        result = &mut server => {
            result.context("server task failed")?.context("server unexpectedly stopped")?;
        }
        _ = shutdown_signal() => {
            info!("shutting down");
            coordinator.shutdown().await;
            server.await.context("server task failed")??;
        }
    }

    posts.close().await.context("failed to close database")?;
    info!("stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
