use std::sync::Arc;

use mock_server::{AppState, DEFAULT_TOKEN_TTL_SECS};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = env_or("PORT", "3000");
    let client_id = env_or("MOCK_CLIENT_ID", "todo-client");
    let client_secret = env_or("MOCK_CLIENT_SECRET", "todo-secret");
    let token_ttl = std::env::var("MOCK_TOKEN_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

    let state = Arc::new(AppState::new(token_ttl).with_client(&client_id, &client_secret));

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, %client_id, token_ttl, "listening");
    mock_server::run(listener, state).await
}
