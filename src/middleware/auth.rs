// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer-token authentication middleware.

use crate::db::is_valid_id;
use crate::services::identity::IdentityError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie carrying the token for browser clients.
pub const SESSION_COOKIE: &str = "rastro_token";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Acting principal, as resolved by the token verifier.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Middleware that requires a verified bearer token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => return Err(StatusCode::UNAUTHORIZED),
        }
    };

    let user_id = match state.verifier.verify(&token).await {
        Ok(id) => id,
        Err(IdentityError::Rejected) => return Err(StatusCode::UNAUTHORIZED),
        Err(IdentityError::Unavailable(reason)) => {
            tracing::warn!(error = %reason, "Token verification unavailable");
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    if !is_valid_id(&user_id) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}
