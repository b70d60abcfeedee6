// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer token provider for the client-credentials grant.
//!
//! There is no refresh token: when the cached token expires (or the API
//! rejects it) a new one is requested from scratch.

use crate::error::AppError;
use crate::services::intra::IntraClient;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively re-request (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Longest we reuse a token, whatever the API says (~58 minutes).
const TOKEN_CACHE_TTL_SECS: i64 = 3500;

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 7200;

/// Static OAuth client credentials.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Trim and validate credentials; empty values are rejected up front.
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, AppError> {
        let client_id = client_id.trim();
        let client_secret = client_secret.trim();
        if client_id.is_empty() {
            return Err(AppError::InvalidCredentials("client id is empty"));
        }
        if client_secret.is_empty() {
            return Err(AppError::InvalidCredentials("client secret is empty"));
        }
        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.client_id.chars().take(10).collect();
        f.debug_struct("Credentials")
            .field("client_id", &format!("{}...", prefix))
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Cached access token with expiry information.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Hands out a valid bearer token, requesting one when needed.
///
/// The cache lives behind an async mutex that is held across the exchange,
/// so concurrent callers wait for one request instead of racing.
pub struct TokenProvider {
    client: IntraClient,
    credentials: Credentials,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(client: IntraClient, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
            cache: Mutex::new(None),
        }
    }

    /// Get a valid bearer token, exchanging credentials if the cache is cold.
    ///
    /// Any failure is reported as [`AppError::NoToken`].
    pub async fn token(&self) -> Result<String, AppError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if Utc::now() < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
            tracing::debug!("Cached token expired");
        }

        tracing::info!(client_id = ?self.credentials, "Requesting campus API token");
        let response = self
            .client
            .request_token(&self.credentials)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Token exchange failed");
                AppError::NoToken(e.to_string())
            })?;

        let access_token = response.access_token.unwrap_or_default();
        let lifetime = cache_lifetime(response.expires_in);
        *cache = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Utc::now() + lifetime,
        });

        tracing::info!(valid_for_secs = lifetime.num_seconds(), "Token cached");
        Ok(access_token)
    }

    /// Drop the cached token; the next call to [`token`](Self::token) requests a new one.
    pub async fn invalidate(&self) {
        if self.cache.lock().await.take().is_some() {
            tracing::info!("Token cache invalidated");
        }
    }

    /// True when a non-expired token is cached.
    pub async fn is_cached(&self) -> bool {
        self.cache
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| Utc::now() < c.expires_at)
    }
}

/// How long to reuse a token the API says lives `expires_in` seconds.
fn cache_lifetime(expires_in: Option<u64>) -> Duration {
    let expires_in = expires_in
        .map(|s| s.min(i64::MAX as u64) as i64)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let secs = (expires_in - TOKEN_REFRESH_MARGIN_SECS)
        .min(TOKEN_CACHE_TTL_SECS)
        .max(0);
    Duration::seconds(secs)
}
