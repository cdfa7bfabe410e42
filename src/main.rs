use std::net::SocketAddr;
use tiktok_dashboard::{router, scheduler, AppState, Settings};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let settings = Settings::from_env();
    let interval = settings.update_interval;
    let port = settings.port;

    let state = AppState::new(settings);
    info!(
        api_type = ?state.config.api_type().await,
        redirect_uri = %state.config.credentials().await.redirect_uri,
        "configuration loaded"
    );
    scheduler::spawn(state.dashboard.clone(), interval);

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
