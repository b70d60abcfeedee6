// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Campus directory: the full `/v2/campus` listing, cached for an hour.

use crate::config::FetchSettings;
use crate::error::AppError;
use crate::models::Campus;
use crate::services::intra::{IntraClient, PageControl, PageLimits};
use crate::services::token::TokenProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const CAMPUS_PATH: &str = "/v2/campus";

struct CachedCampuses {
    campuses: Arc<Vec<Campus>>,
    fetched_at: Instant,
}

/// Paginated campus listing with a TTL cache.
pub struct CampusDirectory {
    client: IntraClient,
    tokens: Arc<TokenProvider>,
    limits: PageLimits,
    ttl: Duration,
    cache: Mutex<Option<CachedCampuses>>,
}

impl CampusDirectory {
    pub fn new(client: IntraClient, tokens: Arc<TokenProvider>, settings: &FetchSettings) -> Self {
        Self {
            client,
            tokens,
            limits: PageLimits {
                page_size: settings.page_size,
                max_pages: settings.max_pages,
            },
            ttl: settings.campus_cache_ttl,
            cache: Mutex::new(None),
        }
    }

    /// All campuses, from cache while it is fresh.
    pub async fn campuses(&self) -> Result<Arc<Vec<Campus>>, AppError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.campuses.clone());
            }
        }

        let campuses = Arc::new(self.fetch_all().await?);
        *cache = Some(CachedCampuses {
            campuses: campuses.clone(),
            fetched_at: Instant::now(),
        });
        Ok(campuses)
    }

    /// Look up one campus by id.
    pub async fn find(&self, campus_id: u64) -> Result<Option<Campus>, AppError> {
        Ok(self
            .campuses()
            .await?
            .iter()
            .find(|c| c.id == campus_id)
            .cloned())
    }

    /// Drop the cached listing.
    pub async fn clear(&self) {
        *self.cache.lock().await = None;
    }

    /// Fetch every page of the campus listing, bypassing the cache.
    ///
    /// A failure before any campus arrives is an error; a later failure
    /// returns what was gathered.
    pub async fn fetch_all(&self) -> Result<Vec<Campus>, AppError> {
        let token = self.tokens.token().await?;
        let mut campuses: Vec<Campus> = Vec::new();
        let mut malformed = 0usize;

        let mut run = self
            .client
            .paginate(&token, CAMPUS_PATH, &[], self.limits, |rows| {
                for row in rows {
                    match serde_json::from_value::<Campus>(row) {
                        Ok(campus) => campuses.push(campus),
                        Err(_) => malformed += 1,
                    }
                }
                PageControl::Continue
            })
            .await;

        if run.token_rejected() {
            self.tokens.invalidate().await;
        }
        if malformed > 0 {
            tracing::warn!(malformed, "Skipped malformed campus rows");
        }

        if let Some(err) = run.error.take() {
            if campuses.is_empty() {
                return Err(err);
            }
            tracing::warn!(
                error = %err,
                fetched = campuses.len(),
                "Campus listing incomplete"
            );
        }

        tracing::info!(
            count = campuses.len(),
            pages = run.pages_fetched,
            "Campus directory loaded"
        );
        Ok(campuses)
    }
}
