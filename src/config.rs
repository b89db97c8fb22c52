// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

/// Marketplace policy constants.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketPolicy {
    /// A listing must stay open at least this many days.
    pub min_listing_days: i64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for MarketPolicy {
    fn default() -> Self {
        Self {
            min_listing_days: 5,
            default_page_size: 10,
            max_page_size: 20,
        }
    }
}

/// Which document store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// HS256 key for locally verified bearer tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// External auth service; when set, tokens are verified remotely
    pub auth_verify_url: Option<String>,
    /// Principals allowed to correct or remove bids
    pub admin_ids: Vec<String>,
    /// Seconds between reconciliation sweeps; 0 disables the sweep
    pub reconcile_interval_secs: u64,
    pub policy: MarketPolicy,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            auth_verify_url: None,
            admin_ids: vec!["admin".to_string()],
            reconcile_interval_secs: 0,
            policy: MarketPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let auth_verify_url = env::var("AUTH_VERIFY_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        // The local key is only needed when tokens are not verified remotely.
        let jwt_signing_key = match env::var("JWT_SIGNING_KEY") {
            Ok(key) => key.into_bytes(),
            Err(_) if auth_verify_url.is_some() => Vec::new(),
            Err(_) => return Err(ConfigError::Missing("JWT_SIGNING_KEY")),
        };

        let defaults = MarketPolicy::default();
        let policy = MarketPolicy {
            min_listing_days: check_listing_days(parse_or(
                "MIN_LISTING_DAYS",
                defaults.min_listing_days,
            )?)?,
            default_page_size: parse_or("DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: parse_or("MAX_PAGE_SIZE", defaults.max_page_size)?,
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store_backend: env::var("STORE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StoreBackend::Firestore))?,
            jwt_signing_key,
            auth_verify_url,
            admin_ids: env::var("ADMIN_USER_IDS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            reconcile_interval_secs: parse_or("RECONCILE_INTERVAL_SECS", 0)?,
            policy,
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Longest minimum listing window accepted from the environment.
const MAX_LISTING_DAYS: i64 = 365;

fn check_listing_days(days: i64) -> Result<i64, ConfigError> {
    if (0..=MAX_LISTING_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::Invalid("MIN_LISTING_DAYS", days.to_string()))
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("STORE_BACKEND", "Memory");
        env::set_var("ADMIN_USER_IDS", "ops, root ,,");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.jwt_signing_key, b"test_jwt_key_32_bytes_minimum!!");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.admin_ids, vec!["ops", "root"]);
        assert_eq!(config.policy, MarketPolicy::default());
    }

    #[test]
    fn test_listing_days_must_be_a_sane_window() {
        assert_eq!(check_listing_days(0).unwrap(), 0);
        assert_eq!(check_listing_days(365).unwrap(), 365);
        assert!(matches!(
            check_listing_days(366),
            Err(ConfigError::Invalid("MIN_LISTING_DAYS", _))
        ));
        assert!(check_listing_days(-1).is_err());
        assert!(check_listing_days(i64::MAX).is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!("postgres".parse::<StoreBackend>().is_err());
        assert_eq!(" firestore ".parse::<StoreBackend>().unwrap(), StoreBackend::Firestore);
    }
}
