//! ledgerchat server entry point.
//!
//! Reads DeepSeek and ezBookkeeping MCP settings from the environment,
//! builds the shared application state, and serves the chat UI over
//! HTTP.

extern crate alloc;

mod chat;
mod config;
mod extract;
mod llm;
mod mcp;
mod params;
mod web;

use alloc::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::web::AppState;

/// Runs the chat server.
///
/// # Errors
///
/// Returns an error if a required environment variable is missing, an
/// HTTP client cannot be built, the listen address cannot be bound, or
/// the server fails while running.
async fn run() -> Result<(), Box<dyn core::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    tracing::info!(addr = %config.bind_addr, model = %config.model, "starting ledgerchat");

    let state = Arc::new(AppState::new(&config)?);

    // One-shot MCP reachability check; failures are logged, not fatal.
    match state.mcp().query_all_accounts().await {
        Ok(accounts) => {
            let count = accounts.as_array().map_or(0_usize, Vec::len);
            tracing::info!(count, "MCP endpoint reachable");
        }
        Err(err) => {
            tracing::warn!(%err, "MCP probe failed; transaction submission may not work");
        }
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, web::router(state)).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(%err, "fatal error");
        std::process::exit(1);
    }
}
