// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat routes. Clients poll; there is no push delivery.

use super::check;
use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Chat, Message};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// All chat routes require authentication.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/products/{id}/chats", post(open_chat))
        .route("/api/v1/chats", get(list_chats))
        .route("/api/v1/chats/{id}", get(get_chat))
        .route(
            "/api/v1/chats/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/api/v1/chats/{id}/last-message", get(last_message))
}

async fn open_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<String>,
) -> Result<Json<Chat>> {
    Ok(Json(state.engine.open_chat(&user.user_id, &product_id).await?))
}

async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Chat>>> {
    Ok(Json(state.engine.list_chats(&user.user_id).await?))
}

async fn get_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Chat>> {
    Ok(Json(state.engine.get_chat(&user.user_id, &id).await?))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    Ok(Json(state.engine.list_messages(&user.user_id, &id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    text: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    check(&body)?;
    let message = state
        .engine
        .send_message(&user.user_id, &id, &body.text)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn last_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Option<Message>>> {
    Ok(Json(state.engine.last_message(&user.user_id, &id).await?))
}
