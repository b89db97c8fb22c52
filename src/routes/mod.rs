// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod bids;
pub mod chats;
pub mod products;
pub mod users;

use crate::error::AppError;
use crate::middleware::auth::require_auth;
use crate::services::Outcome;
use crate::AppState;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Set on responses whose primary write committed but some mirror copies
/// are still stale.
pub const CONSISTENCY_HEADER: &str = "x-consistency";

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
    /// Entities waiting for mirror repair
    pub pending_repairs: usize,
}

/// Health check response
async fn health_check(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
        pending_repairs: state.engine.repairs().len(),
    })
}

/// Serialize an engine outcome, flagging stale mirrors in a header.
pub(crate) fn respond<T: Serialize>(status: StatusCode, outcome: Outcome<T>) -> Response {
    let stale = outcome.stale.len();
    mark_partial((status, Json(outcome.value)).into_response(), stale)
}

/// Like [`respond`] for writes with no body.
pub(crate) fn respond_empty<T>(outcome: Outcome<T>) -> Response {
    mark_partial(StatusCode::NO_CONTENT.into_response(), outcome.stale.len())
}

fn mark_partial(mut response: Response, stale: usize) -> Response {
    if stale > 0 {
        tracing::warn!(stale_mirrors = stale, "Responding with partially propagated write");
        response
            .headers_mut()
            .insert(CONSISTENCY_HEADER, HeaderValue::from_static("partial"));
    }
    response
}

/// Map `validator` failures onto a 400.
pub(crate) fn check<T: validator::Validate>(body: &T) -> Result<(), AppError> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow requests from frontend URL and localhost (for dev)
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_url
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::HeaderName::from_static(CONSISTENCY_HEADER)]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .merge(products::public_routes())
        .merge(bids::public_routes())
        .merge(users::public_routes());

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .merge(products::protected_routes())
        .merge(bids::protected_routes())
        .merge(users::protected_routes())
        .merge(chats::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
