// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bid routes. Bids are placed through `/products/{id}/bids`; changing or
//! removing one afterwards is an administrative correction.

use super::{check, respond, respond_empty};
use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::Bid;
use crate::services::{BidQuery, Page};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/bids", get(list_bids))
        .route("/api/v1/bids/{id}", get(get_bid))
}

pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/v1/bids/{id}", put(update_bid).delete(delete_bid))
}

async fn list_bids(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BidQuery>,
) -> Result<Json<Page<Bid>>> {
    Ok(Json(state.engine.list_bids(&query).await?))
}

async fn get_bid(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Bid>> {
    Ok(Json(state.engine.get_bid(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateBidRequest {
    #[validate(range(min = 0.0))]
    amount: f64,
}

async fn update_bid(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBidRequest>,
) -> Result<Response> {
    check(&body)?;
    let outcome = state
        .engine
        .update_bid(&user.user_id, &id, body.amount)
        .await?;
    Ok(respond(StatusCode::OK, outcome))
}

async fn delete_bid(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response> {
    let outcome = state.engine.delete_bid(&user.user_id, &id).await?;
    Ok(respond_empty(outcome))
}
