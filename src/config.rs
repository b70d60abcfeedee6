// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The client credentials are read once at startup; a missing credential is a
//! hard stop rather than something the fetch path has to handle.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default campus API base URL.
pub const DEFAULT_API_URL: &str = "https://api.intra.42.fr";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth client ID for the client-credentials grant
    pub intra_client_id: String,
    /// OAuth client secret
    pub intra_client_secret: String,
    /// Base URL of the campus REST API (no trailing slash)
    pub intra_api_url: String,
    /// Token endpoint for the client-credentials grant
    pub intra_token_url: String,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Paging, caching and timeout knobs for the fetch path
    pub fetch: FetchSettings,
}

/// Tunables shared by the campus directory and the active-user fetcher.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Rows requested per page (`page[size]`)
    pub page_size: u32,
    /// Safety cap on pages per paginated listing
    pub max_pages: u32,
    /// How many merged users get a per-user detail fetch
    pub detail_limit: usize,
    /// Lookback window used when a request does not specify one
    pub default_days_back: u32,
    /// Result cap used when a request does not specify one
    pub default_max_users: usize,
    /// Delay used when a 429 carries no Retry-After header
    pub default_retry_after: Duration,
    /// How long the campus list is reused before refetching
    pub campus_cache_ttl: Duration,
    /// Suggested UI auto-refresh period; also the snapshot reuse window
    pub auto_refresh_interval: Duration,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 20,
            detail_limit: 50,
            default_days_back: 7,
            default_max_users: 200,
            default_retry_after: Duration::from_secs(2),
            campus_cache_ttl: Duration::from_secs(3600),
            auto_refresh_interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(20),
        }
    }
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            intra_client_id: "test_client_id".to_string(),
            intra_client_secret: "test_secret".to_string(),
            intra_api_url: DEFAULT_API_URL.to_string(),
            intra_token_url: format!("{}/oauth/token", DEFAULT_API_URL),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            fetch: FetchSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let intra_api_url = env::var("INTRA_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let intra_token_url = env::var("INTRA_TOKEN_URL")
            .unwrap_or_else(|_| format!("{}/oauth/token", intra_api_url));

        let defaults = FetchSettings::default();
        let fetch = FetchSettings {
            page_size: parse_or("PAGE_SIZE", defaults.page_size)?,
            max_pages: parse_or("MAX_PAGES", defaults.max_pages)?,
            detail_limit: parse_or("DETAIL_LIMIT", defaults.detail_limit)?,
            default_days_back: parse_or("DEFAULT_DAYS_BACK", defaults.default_days_back)?,
            default_max_users: parse_or("DEFAULT_MAX_USERS", defaults.default_max_users)?,
            default_retry_after: Duration::from_secs(parse_or(
                "DEFAULT_RETRY_AFTER_SECS",
                defaults.default_retry_after.as_secs(),
            )?),
            campus_cache_ttl: Duration::from_secs(parse_or(
                "CAMPUS_CACHE_TTL_SECS",
                defaults.campus_cache_ttl.as_secs(),
            )?),
            auto_refresh_interval: Duration::from_secs(parse_or(
                "AUTO_REFRESH_INTERVAL_SECS",
                defaults.auto_refresh_interval.as_secs(),
            )?),
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
        };

        if fetch.page_size == 0 {
            return Err(ConfigError::Invalid("PAGE_SIZE", "must be positive".to_string()));
        }

        Ok(Self {
            intra_client_id: required("INTRA_CLIENT_ID")?,
            intra_client_secret: required("INTRA_CLIENT_SECRET")?,
            intra_api_url,
            intra_token_url,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            fetch,
        })
    }
}

/// Read a secret, trimming stray whitespace; empty counts as missing.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
