// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Campus-Tracker API Server
//!
//! Serves campus listings and active-user snapshots pulled from the 42
//! campus API.

use campus_tracker::{config::Config, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment; missing credentials stop here
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        api_url = %config.intra_api_url,
        "Starting Campus-Tracker API"
    );

    let state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(
        page_size = config.fetch.page_size,
        max_pages = config.fetch.max_pages,
        detail_limit = config.fetch.detail_limit,
        "Campus API client initialized"
    );

    // Build router
    let app = campus_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("campus_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
