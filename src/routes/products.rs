// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Product listing routes.

use super::{check, respond, respond_empty};
use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{NewProduct, Product, ProductPatch, Rating};
use crate::services::{Page, ProductQuery};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/{id}", get(get_product))
        .route("/api/v1/products/{id}/related", get(related_products))
}

pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/products", post(create_product))
        .route(
            "/api/v1/products/{id}",
            axum::routing::put(update_product).delete(delete_product),
        )
        .route("/api/v1/products/{id}/resolve", post(resolve_product))
        .route("/api/v1/products/{id}/bids", post(submit_bid))
        .route("/api/v1/products/{id}/ratings", post(rate_product))
}

// ─── Listings ────────────────────────────────────────────────

async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Page<Product>>> {
    Ok(Json(state.engine.list_products(&query).await?))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Product>> {
    Ok(Json(state.engine.get_product(&id).await?))
}

async fn related_products(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.engine.related_products(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    description: String,
    #[validate(range(min = 0.0))]
    initial_price: f64,
    close_date: DateTime<Utc>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    weight: f64,
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateProductRequest>,
) -> Result<Response> {
    check(&body)?;
    let outcome = state
        .engine
        .create_product(
            &user.user_id,
            NewProduct {
                title: body.title,
                description: body.description,
                initial_price: body.initial_price,
                close_date: body.close_date,
                weight: body.weight,
            },
        )
        .await?;
    Ok(respond(StatusCode::CREATED, outcome))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    title: Option<String>,
    #[validate(length(max = 5000))]
    description: Option<String>,
    #[validate(range(min = 0.0))]
    initial_price: Option<f64>,
    #[validate(range(min = 0.0))]
    weight: Option<f64>,
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Response> {
    check(&body)?;
    let patch = ProductPatch {
        title: body.title,
        description: body.description,
        initial_price: body.initial_price,
        weight: body.weight,
    };
    let outcome = state
        .engine
        .update_product(&user.user_id, &id, patch)
        .await?;
    Ok(respond(StatusCode::OK, outcome))
}

async fn delete_product(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response> {
    let outcome = state.engine.delete_product(&user.user_id, &id).await?;
    Ok(respond_empty(outcome))
}

#[derive(Debug, Deserialize, Validate)]
struct ResolveRequest {
    #[validate(length(min = 1))]
    buyer_id: String,
}

async fn resolve_product(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Result<Response> {
    check(&body)?;
    let outcome = state
        .engine
        .resolve_product(&user.user_id, &id, &body.buyer_id)
        .await?;
    Ok(respond(StatusCode::OK, outcome))
}

// ─── Bids & Ratings ──────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
struct BidRequest {
    #[validate(range(min = 0.0))]
    amount: f64,
}

async fn submit_bid(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<BidRequest>,
) -> Result<Response> {
    check(&body)?;
    let outcome = state
        .engine
        .submit_bid(&id, &user.user_id, body.amount)
        .await?;
    Ok(respond(StatusCode::CREATED, outcome))
}

#[derive(Debug, Deserialize, Validate)]
struct RatingRequest {
    #[validate(range(min = 1.0, max = 5.0))]
    value: f64,
}

async fn rate_product(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<RatingRequest>,
) -> Result<(StatusCode, Json<Rating>)> {
    check(&body)?;
    let rating = state
        .engine
        .record_rating(&id, &user.user_id, body.value)
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}
