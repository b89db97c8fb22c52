// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile, listing and rating routes.

use super::{check, respond};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Location, NewUser, Product, ProductSummary, Rating, User, UserBrief, UserPatch};
use crate::services::{BidderProducts, Page};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/users", get(list_users).post(create_user))
        .route("/api/v1/users/{id}", get(get_user))
        .route("/api/v1/users/by-username/{username}", get(get_by_username))
        .route("/api/v1/users/{id}/products", get(owner_products))
        .route("/api/v1/users/{id}/bid-products", get(bidder_products))
        .route("/api/v1/users/{id}/sold", get(sold_count))
        .route("/api/v1/users/{id}/buyers", get(buyers))
        .route("/api/v1/users/{id}/ratings", get(list_ratings))
        .route("/api/v1/users/{id}/rating", get(overall_rating))
}

pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/v1/me", get(get_me).put(update_me))
}

// ─── Profiles ────────────────────────────────────────────────

/// Public view of a user; the email stays private.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub location: Location,
    pub products: Vec<ProductSummary>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            location: user.location,
            products: user.products,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct LocationInput {
    #[validate(range(min = -90.0, max = 90.0))]
    lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    lon: f64,
}

impl From<LocationInput> for Location {
    fn from(input: LocationInput) -> Self {
        Location {
            lat: input.lat,
            lon: input.lon,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct CreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    username: String,
    #[validate(email)]
    email: String,
    #[validate(nested)]
    location: LocationInput,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    check(&body)?;
    let user = state
        .engine
        .create_user(NewUser {
            username: body.username,
            email: body.email,
            location: body.location.into(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<UserBrief>>> {
    Ok(Json(
        state
            .engine
            .list_users(params.page, params.page_size)
            .await?,
    ))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.engine.get_user(&id).await?.into()))
}

async fn get_by_username(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<UserProfile>> {
    let user = state
        .engine
        .find_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {:?}", username)))?;
    Ok(Json(user.into()))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>> {
    Ok(Json(state.engine.get_user(&user.user_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateUserRequest {
    #[validate(length(min = 3, max = 50))]
    username: Option<String>,
    #[validate(nested)]
    location: Option<LocationInput>,
}

/// Change the caller's username or location. Every embedded copy follows.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Response> {
    check(&body)?;
    let patch = UserPatch {
        username: body.username,
        location: body.location.map(Location::from),
    };
    let outcome = state.engine.update_user(&user.user_id, patch).await?;
    Ok(respond(StatusCode::OK, outcome))
}

// ─── Products by user ────────────────────────────────────────

async fn owner_products(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.engine.owner_products(&id).await?))
}

async fn bidder_products(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BidderProducts>> {
    Ok(Json(state.engine.bidder_products(&id).await?))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SoldResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub sold: u64,
}

async fn sold_count(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SoldResponse>> {
    Ok(Json(SoldResponse {
        sold: state.engine.sold_count(&id).await?,
    }))
}

async fn buyers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UserBrief>>> {
    Ok(Json(state.engine.buyers(&id).await?))
}

// ─── Ratings ─────────────────────────────────────────────────

async fn list_ratings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Rating>>> {
    Ok(Json(state.engine.list_ratings(&id).await?))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RatingResponse {
    /// Mean of all ratings; 0 when nobody has rated the user yet
    pub rating: f64,
}

async fn overall_rating(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RatingResponse>> {
    Ok(Json(RatingResponse {
        rating: state.engine.overall_rating(&id).await?,
    }))
}
