use std::net::SocketAddr;

use class_scraper_server::{AppState, ServerConfig, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Class data file: {}", config.data_file.display());
    log::info!("Refresh command: {}", config.scraper_bin.display());

    let ct = tokio_util::sync::CancellationToken::new();
    let router = router(AppState::new(config, ct.child_token()));
    let tcp_listener = tokio::net::TcpListener::bind(address).await?;

    log::info!("Server running on http://{}", address);

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            ct.cancel();
        })
        .await?;

    Ok(())
}
