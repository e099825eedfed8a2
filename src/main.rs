use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use site_chat::api;
use site_chat::config::Config;
use site_chat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    match &config.fallback_llm {
        Some(fallback) => tracing::info!("Fallback LLM: {} ({})", fallback.provider, fallback.base_url),
        None => tracing::info!("No fallback LLM configured"),
    }

    let state = AppState::new(config.clone()).await?;

    // Forget clients whose contact-form window has fully elapsed.
    let limiter = state.contact_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.window().max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let dropped = limiter.sweep();
            if dropped > 0 {
                tracing::debug!("Rate limiter dropped {dropped} idle clients");
            }
        }
    });

    let app = Router::new()
        // Serve frontend
        .route("/", get(api::pages::index))
        // API routes
        .route("/api/health", get(api::pages::health))
        .route("/api/chat", post(api::chat::chat))
        .route("/contact", post(api::contact::contact))
        .with_state(state)
        .fallback(get(api::pages::index));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
