//! Atrium API Server Entry Point
//!
//! Loads configuration, seeds the in-memory store, and starts the Axum
//! HTTP server.

use atrium_api::{create_router, in_memory_state, init_tracing, ApiError, ApiResult, ServiceConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(&config.telemetry)?;
    config.validate()?;

    let (state, _store) = in_memory_state(&config)?;
    let app = create_router(state);

    let addr = config.bind_addr;
    tracing::info!(%addr, "Starting Atrium API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
