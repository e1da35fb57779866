mod auth;
mod config;
mod error;
mod extract;
mod rate_limit;
mod routes;

use config::AppConfig;
use routes::{app_router, AppState};
use spotcheck_core::TrustEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spotcheck_api=info".parse()?)
                .add_directive("spotcheck_core=info".parse()?),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting spotcheck-api with config: {:?}", config);

    let engine = TrustEngine::open_path(&config.database_path, config.trust)?;
    let state = AppState::new(&config, engine);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("spotcheck-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
