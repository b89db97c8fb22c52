// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rastro Marketplace API Server
//!
//! Serves the auction marketplace and keeps the denormalized copies of
//! users, products and bids consistent.

use rastro_market::{
    config::{Config, StoreBackend},
    db::{DocumentStore, FirestoreStore, MemoryStore},
    services::{JwtVerifier, MarketEngine, RemoteVerifier, TokenVerifier},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, backend = ?config.store_backend, "Starting Rastro API");

    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreStore::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let verifier: Arc<dyn TokenVerifier> = match &config.auth_verify_url {
        Some(url) => {
            tracing::info!(url = %url, "Verifying tokens with external auth service");
            Arc::new(RemoteVerifier::new(url.clone())?)
        }
        None => Arc::new(JwtVerifier::new(&config.jwt_signing_key)),
    };

    let engine = MarketEngine::new(store, config.policy.clone(), config.admin_ids.clone());

    if config.reconcile_interval_secs > 0 {
        let reconciler = engine.reconciler();
        let period = Duration::from_secs(config.reconcile_interval_secs);
        tracing::info!(
            interval_secs = config.reconcile_interval_secs,
            "Reconciliation sweep enabled"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                reconciler.sweep().await;
            }
        });
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        engine,
        verifier,
    });

    // Build router
    let app = rastro_market::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rastro_market=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
