// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Campus API client.
//!
//! Handles:
//! - Client-credentials token exchange
//! - Bearer GETs with JSON decoding
//! - Page-by-page listing with `page[size]` / `page[number]`
//! - Rate limit (429) sleeps driven by the injected [`RetryPolicy`]

use crate::config::FetchSettings;
use crate::error::AppError;
use crate::services::retry::{retry_after_header, RetryPolicy};
use crate::services::token::Credentials;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("campus-tracker/", env!("CARGO_PKG_VERSION"));

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Campus API client.
#[derive(Clone)]
pub struct IntraClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    api_retry: RetryPolicy,
    token_retry: RetryPolicy,
}

/// Token endpoint response for the client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Bounds for a paginated listing.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub page_size: u32,
    /// Maximum page requests, rate-limited attempts included.
    pub max_pages: u32,
}

/// What the page callback wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageControl {
    Continue,
    Stop,
}

/// Why a paginated listing stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    /// The API returned an empty page.
    Exhausted,
    /// The API returned fewer rows than the page size.
    ShortPage,
    /// The page cap was reached.
    PageCap,
    /// The caller had enough rows.
    Satisfied,
    /// Every page attempt was still rate limited after the retry.
    RateLimited,
    /// A request failed; rows gathered before it are kept.
    Failed(String),
}

/// Outcome of [`IntraClient::paginate`].
#[derive(Debug)]
pub struct PageRun {
    pub pages_fetched: u32,
    pub rows_seen: usize,
    /// Page attempts lost to a 429 that outlived the retry.
    pub rate_limited: u32,
    pub stop: StopReason,
    /// The failure behind [`StopReason::Failed`], or the last 429 behind
    /// [`StopReason::RateLimited`].
    pub error: Option<AppError>,
}

impl PageRun {
    /// The API answered 401 to the bearer token.
    pub fn token_rejected(&self) -> bool {
        matches!(self.error, Some(AppError::IntraUnauthorized))
    }
}

impl IntraClient {
    /// Create a client for the API at `base_url`.
    pub fn new(base_url: &str, token_url: &str, settings: &FetchSettings) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            api_retry: RetryPolicy::api(settings.default_retry_after),
            token_retry: RetryPolicy::token(settings.default_retry_after),
        })
    }

    /// Replace the retry policies (GETs, token exchange).
    pub fn with_retry_policies(mut self, api: RetryPolicy, token: RetryPolicy) -> Self {
        self.api_retry = api;
        self.token_retry = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange client credentials for a bearer token.
    ///
    /// 401 is terminal. 429 and network failures are retried within the
    /// token policy's bounds. Anything else non-2xx is surfaced as-is.
    pub async fn request_token(&self, credentials: &Credentials) -> Result<TokenResponse, AppError> {
        let response = self
            .execute(&self.token_retry, "oauth/token", || {
                self.http
                    .post(&self.token_url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", credentials.client_id()),
                        ("client_secret", credentials.client_secret()),
                    ])
            })
            .await?;

        let token: TokenResponse = self.check_response_json(response, "oauth/token").await?;
        if token.access_token.as_deref().is_none_or(str::is_empty) {
            return Err(AppError::IntraDecode(
                "token response has no access_token".to_string(),
            ));
        }
        Ok(token)
    }

    /// Bearer GET of `path` (relative to the API base) decoded as `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .execute(&self.api_retry, path, || {
                self.http
                    .get(&url)
                    .bearer_auth(access_token)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .query(query)
            })
            .await?;

        self.check_response_json(response, path).await
    }

    /// One page of a listing as untyped rows.
    pub async fn get_page(
        &self,
        access_token: &str,
        path: &str,
        query: &[(String, String)],
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Value>, AppError> {
        let mut query = query.to_vec();
        query.push(("page[size]".to_string(), page_size.to_string()));
        query.push(("page[number]".to_string(), page.to_string()));
        self.get_json(access_token, path, &query).await
    }

    /// Walk a listing page by page, handing each page to `on_page`.
    ///
    /// Stops on an empty or short page, at the page cap, when `on_page`
    /// returns [`PageControl::Stop`], or on the first non-429 failure. A page
    /// still rate limited after the policy's retry uses up one page attempt
    /// and is requested again; when no attempt got through the run ends with
    /// [`StopReason::RateLimited`].
    pub async fn paginate<F>(
        &self,
        access_token: &str,
        path: &str,
        query: &[(String, String)],
        limits: PageLimits,
        mut on_page: F,
    ) -> PageRun
    where
        F: FnMut(Vec<Value>) -> PageControl,
    {
        let mut run = PageRun {
            pages_fetched: 0,
            rows_seen: 0,
            rate_limited: 0,
            stop: StopReason::PageCap,
            error: None,
        };
        let mut page = 1;

        for attempt in 0..limits.max_pages {
            let rows = match self
                .get_page(access_token, path, query, page, limits.page_size)
                .await
            {
                Ok(rows) => rows,
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!(path, page, attempt, "Page still rate limited, re-attempting");
                    run.rate_limited += 1;
                    run.error = Some(e);
                    continue;
                }
                Err(e) => {
                    tracing::debug!(path, page, error = %e, "Page request failed");
                    run.stop = StopReason::Failed(e.to_string());
                    run.error = Some(e);
                    return run;
                }
            };

            run.pages_fetched += 1;
            run.error = None;
            let count = rows.len();
            run.rows_seen += count;
            tracing::debug!(path, page, rows = count, "Fetched page");

            if count == 0 {
                run.stop = StopReason::Exhausted;
                return run;
            }
            if on_page(rows) == PageControl::Stop {
                run.stop = StopReason::Satisfied;
                return run;
            }
            if count < limits.page_size as usize {
                run.stop = StopReason::ShortPage;
                return run;
            }
            page += 1;
        }

        if run.pages_fetched == 0 && run.rate_limited > 0 {
            run.stop = StopReason::RateLimited;
        } else {
            run.error = None;
        }
        run
    }

    /// Send a request, sleeping and resending per `policy`.
    async fn execute<F>(
        &self,
        policy: &RetryPolicy,
        label: &str,
        build: F,
    ) -> Result<reqwest::Response, AppError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut rate_limited = 0;
        let mut transient = 0;

        loop {
            match build().send().await {
                Ok(response) if RetryPolicy::is_retryable_status(response.status()) => {
                    let retry_after = retry_after_header(response.headers());
                    let delay = policy.rate_limit_delay(retry_after.as_deref(), rate_limited);
                    if rate_limited >= policy.rate_limit_retries {
                        tracing::warn!(endpoint = label, "Campus API rate limit hit (429), giving up");
                        return Err(AppError::IntraRateLimited {
                            retry_after: Some(delay),
                        });
                    }
                    rate_limited += 1;
                    tracing::warn!(
                        endpoint = label,
                        retry_after_ms = delay.as_millis() as u64,
                        "Campus API rate limit hit (429), waiting"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    let err = AppError::from(e);
                    if !err.is_transient() || transient >= policy.transient_retries {
                        return Err(err);
                    }
                    transient += 1;
                    let delay: Duration = policy.transient_delay();
                    tracing::warn!(
                        endpoint = label,
                        error = %err,
                        attempt = transient,
                        "Campus API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        label: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::IntraUnauthorized);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::IntraForbidden(label.to_string()));
        }

        let body = response.text().await?;

        if !status.is_success() {
            let mut body = body;
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(AppError::IntraStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::IntraDecode(format!("{}: {}", label, e)))
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
