// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer-token verification.
//!
//! The engine trusts whatever user id the verifier returns as the acting
//! principal.

use crate::middleware::auth::Claims;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::Duration;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("token rejected")]
    Rejected,

    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token to a user id.
    async fn verify(&self, token: &str) -> Result<String, IdentityError>;
}

/// Verifies HS256 session tokens locally.
pub struct JwtVerifier {
    key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(signing_key: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(signing_key),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<String, IdentityError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.key, &validation)
            .map_err(|_| IdentityError::Rejected)?;
        Ok(data.claims.sub)
    }
}

/// Delegates verification to the external auth service, which answers
/// `200 {"id": ...}` for a valid token.
pub struct RemoteVerifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct VerifiedIdentity {
    id: String,
}

impl RemoteVerifier {
    pub fn new(url: impl Into<String>) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TokenVerifier for RemoteVerifier {
    async fn verify(&self, token: &str) -> Result<String, IdentityError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(IdentityError::Unavailable(format!(
                "auth service returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(IdentityError::Rejected);
        }

        let identity: VerifiedIdentity = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("bad auth response: {}", e)))?;
        Ok(identity.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_jwt(user_id: &str, key: &[u8]) -> String {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + 3600,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(key))
            .expect("sign test token")
    }

    #[tokio::test]
    async fn test_jwt_round_trip_and_wrong_key() {
        let key = b"test_jwt_key_32_bytes_minimum!!";
        let token = create_jwt("65f1c0ffee0000000000abcd", key);

        let verifier = JwtVerifier::new(key);
        assert_eq!(
            verifier.verify(&token).await.unwrap(),
            "65f1c0ffee0000000000abcd"
        );

        let other = JwtVerifier::new(b"some_other_key_that_is_long_enough");
        assert!(matches!(
            other.verify(&token).await,
            Err(IdentityError::Rejected)
        ));
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(IdentityError::Rejected)
        ));
    }
}
