use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxoffice::{
    config::Config, controllers, services::expiration::ExpirationWorker, AppState,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.app.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    info!("Starting boxoffice API");

    let app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    // Reclamation loop; the watch flag stops it scheduling new ticks.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ExpirationWorker::new(
        app_state.stores.clone(),
        app_state.cache.clone(),
        app_state.rooms.clone(),
        &config.reservation,
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let app = Router::new()
        .route("/", get(root_handler))
        .nest("/api", controllers::routes())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .expect("HOST/PORT must form a valid socket address");
    info!("Server listening on http://{}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {}", e);
        std::process::exit(1);
    }

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    info!("Shutdown complete");
}

async fn root_handler() -> &'static str {
    "boxoffice API v1.0"
}

/// Resolves on SIGINT or SIGTERM; in-flight requests then drain.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, draining"),
        _ = terminate => info!("SIGTERM received, draining"),
    }
}
