// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Active-user fetcher.
//!
//! Handles the core workflow:
//! 1. Collect users holding an open location session on the campus
//! 2. Fill up with users whose records changed inside the lookback window,
//!    trying each listing variant in [`ACTIVITY_ENDPOINTS`] in order
//! 3. Merge by user id (location-derived entries win)
//! 4. Fetch per-user details for a bounded prefix of the result
//!
//! A failing endpoint only ends that endpoint's attempt. Losing the token is
//! the one failure that aborts the whole fetch.

use crate::config::FetchSettings;
use crate::error::{AppError, Result};
use crate::models::{FetchSource, LocationRecord, RawUser};
use crate::services::intra::{IntraClient, PageControl, PageLimits, PageRun, StopReason};
use crate::services::token::TokenProvider;
use crate::time_utils::{format_utc_rfc3339, parse_timestamp};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Pages per activity endpoint never exceed this, whatever `max_users` is.
const ACTIVITY_MAX_PAGES: u32 = 10;

/// Which strategies to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Location first, then recent activity for the remainder.
    #[default]
    Hybrid,
    #[serde(alias = "activity")]
    ActivityOnly,
    #[serde(alias = "location")]
    LocationOnly,
}

impl SearchMethod {
    pub const ALL: [SearchMethod; 3] = [
        SearchMethod::Hybrid,
        SearchMethod::ActivityOnly,
        SearchMethod::LocationOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Hybrid => "hybrid",
            SearchMethod::ActivityOnly => "activity_only",
            SearchMethod::LocationOnly => "location_only",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchParams {
    pub campus_id: u64,
    pub days_back: u32,
    pub max_users: usize,
    pub method: SearchMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingPath {
    /// `/v2/users?filter[campus_id]=..`
    Users,
    /// `/v2/campus/{id}/users`
    CampusUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeField {
    UpdatedAt,
    CreatedAt,
}

impl RangeField {
    fn as_str(&self) -> &'static str {
        match self {
            RangeField::UpdatedAt => "updated_at",
            RangeField::CreatedAt => "created_at",
        }
    }
}

/// One listing variant tried by the activity strategy.
#[derive(Debug, Clone, Copy)]
pub struct ActivityEndpoint {
    pub label: &'static str,
    path: ListingPath,
    range: Option<RangeField>,
    sort: &'static str,
}

/// Activity listing variants, most precise first.
pub const ACTIVITY_ENDPOINTS: [ActivityEndpoint; 5] = [
    ActivityEndpoint {
        label: "users_updated_in_range",
        path: ListingPath::Users,
        range: Some(RangeField::UpdatedAt),
        sort: "-updated_at",
    },
    ActivityEndpoint {
        label: "users_created_in_range",
        path: ListingPath::Users,
        range: Some(RangeField::CreatedAt),
        sort: "-created_at",
    },
    ActivityEndpoint {
        label: "campus_users_updated_in_range",
        path: ListingPath::CampusUsers,
        range: Some(RangeField::UpdatedAt),
        sort: "-updated_at",
    },
    ActivityEndpoint {
        label: "campus_users_by_update",
        path: ListingPath::CampusUsers,
        range: None,
        sort: "-updated_at",
    },
    ActivityEndpoint {
        label: "users_by_update",
        path: ListingPath::Users,
        range: None,
        sort: "-updated_at",
    },
];

impl ActivityEndpoint {
    pub fn path(&self, campus_id: u64) -> String {
        match self.path {
            ListingPath::Users => "/v2/users".to_string(),
            ListingPath::CampusUsers => format!("/v2/campus/{}/users", campus_id),
        }
    }

    pub fn query(
        &self,
        campus_id: u64,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if self.path == ListingPath::Users {
            query.push(("filter[campus_id]".to_string(), campus_id.to_string()));
        }
        if let Some(field) = self.range {
            query.push((
                format!("range[{}]", field.as_str()),
                format!("{},{}", format_utc_rfc3339(since), format_utc_rfc3339(now)),
            ));
        }
        query.push(("sort".to_string(), self.sort.to_string()));
        query
    }

    /// Rows without campus info are accepted only when the path itself is
    /// campus scoped.
    fn accepts_unscoped_rows(&self) -> bool {
        self.path == ListingPath::CampusUsers
    }
}

/// One strategy/endpoint attempt, for the debug report.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptReport {
    pub strategy: FetchSource,
    pub endpoint: &'static str,
    pub pages: u32,
    pub rows_seen: usize,
    pub rows_kept: usize,
    pub stop: StopReason,
}

/// What happened during a fetch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub params: FetchParams,
    pub attempts: Vec<AttemptReport>,
    pub location_users: usize,
    pub activity_users: usize,
    pub merged_users: usize,
    pub enriched: usize,
    /// Listing rows that could not be read as a record at all.
    pub malformed_rows: usize,
    /// Problems worth showing to the user; the fetch still returned.
    pub warnings: Vec<String>,
}

/// Result of [`ActiveUserFetcher::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// At most `max_users` records, unique by id.
    pub users: Vec<RawUser>,
    pub report: FetchReport,
}

/// Produces the active users of a campus.
pub struct ActiveUserFetcher {
    client: IntraClient,
    tokens: Arc<TokenProvider>,
    page_size: u32,
    max_pages: u32,
    detail_limit: usize,
}

impl ActiveUserFetcher {
    pub fn new(client: IntraClient, tokens: Arc<TokenProvider>, settings: &FetchSettings) -> Self {
        Self {
            client,
            tokens,
            page_size: settings.page_size,
            max_pages: settings.max_pages,
            detail_limit: settings.detail_limit,
        }
    }

    /// Fetch, merge and enrich the active users of a campus.
    pub async fn fetch(&self, params: &FetchParams) -> Result<FetchOutcome> {
        let mut token = self.tokens.token().await?;
        let now = Utc::now();
        let since = now - Duration::days(i64::from(params.days_back));

        tracing::info!(
            campus_id = params.campus_id,
            days_back = params.days_back,
            max_users = params.max_users,
            method = %params.method,
            "Fetching active users"
        );

        let mut report = FetchReport {
            params: params.clone(),
            attempts: Vec::new(),
            location_users: 0,
            activity_users: 0,
            merged_users: 0,
            enriched: 0,
            malformed_rows: 0,
            warnings: Vec::new(),
        };

        let located = if params.method != SearchMethod::ActivityOnly {
            let users = self
                .location_users(&mut token, params, &mut report)
                .await?;
            report.location_users = users.len();
            users
        } else {
            Vec::new()
        };

        let active = if params.method != SearchMethod::LocationOnly
            && located.len() < params.max_users
        {
            let known: HashSet<u64> = located.iter().map(|u| u.id).collect();
            let users = self
                .activity_users(&mut token, params, since, now, &known, &mut report)
                .await?;
            report.activity_users = users.len();
            users
        } else {
            Vec::new()
        };

        let mut users = merge_by_id(located, active, params.max_users);
        report.merged_users = users.len();

        report.enriched = self.enrich(&mut token, &mut users).await?;

        if users.is_empty() {
            report.warnings.push(format!(
                "No users found for campus {} in the last {} day(s); try a longer window or another search method",
                params.campus_id, params.days_back
            ));
        }

        tracing::info!(
            campus_id = params.campus_id,
            location = report.location_users,
            activity = report.activity_users,
            merged = report.merged_users,
            enriched = report.enriched,
            "Active users fetched"
        );

        Ok(FetchOutcome { users, report })
    }

    /// Users with an open location session, most recent session first.
    ///
    /// A user with several open sessions appears once, dated by the latest.
    async fn location_users(
        &self,
        token: &mut String,
        params: &FetchParams,
        report: &mut FetchReport,
    ) -> Result<Vec<RawUser>> {
        let path = format!("/v2/campus/{}/locations", params.campus_id);
        let query = vec![
            ("filter[active]".to_string(), "true".to_string()),
            ("sort".to_string(), "-begin_at".to_string()),
        ];
        let limits = PageLimits {
            page_size: self.page_size,
            max_pages: self.max_pages,
        };

        let mut users: Vec<RawUser> = Vec::new();
        let mut index: HashMap<u64, usize> = HashMap::new();
        let mut malformed = 0usize;
        let max_users = params.max_users;

        let run = self
            .client
            .paginate(token.as_str(), &path, &query, limits, |rows| {
                for row in rows {
                    let Some(record) = decode_row::<LocationRecord>(row, &mut malformed) else {
                        continue;
                    };
                    if !record.is_open() {
                        continue;
                    }
                    if let Some(&pos) = index.get(&record.user.id) {
                        let known = &mut users[pos];
                        if is_later(record.begin_at.as_deref(), known.last_location.as_deref()) {
                            known.last_location = record.begin_at;
                        }
                        continue;
                    }
                    let mut user = record.user;
                    user.mark_present(record.begin_at);
                    index.insert(user.id, users.len());
                    users.push(user);
                    if users.len() >= max_users {
                        return PageControl::Stop;
                    }
                }
                PageControl::Continue
            })
            .await;

        note_malformed("campus_locations_active", malformed, report);
        self.after_run(token, &run, "campus_locations_active", report)
            .await?;
        report.attempts.push(AttemptReport {
            strategy: FetchSource::Location,
            endpoint: "campus_locations_active",
            pages: run.pages_fetched,
            rows_seen: run.rows_seen,
            rows_kept: users.len(),
            stop: run.stop,
        });

        Ok(users)
    }

    /// Users whose records changed within the window, deduplicated.
    ///
    /// Ids in `known` are still returned (so the merge can fill their
    /// fields) but do not count toward `max_users`.
    async fn activity_users(
        &self,
        token: &mut String,
        params: &FetchParams,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        known: &HashSet<u64>,
        report: &mut FetchReport,
    ) -> Result<Vec<RawUser>> {
        let limits = PageLimits {
            page_size: self.page_size,
            max_pages: activity_page_cap(params.max_users, self.page_size),
        };

        let mut users: Vec<RawUser> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut new_users = 0usize;
        let room = params.max_users.saturating_sub(known.len());

        for endpoint in ACTIVITY_ENDPOINTS.iter() {
            if new_users >= room {
                break;
            }

            let path = endpoint.path(params.campus_id);
            let query = endpoint.query(params.campus_id, since, now);
            let mut kept = 0usize;
            let mut malformed = 0usize;

            let run = self
                .client
                .paginate(token.as_str(), &path, &query, limits, |rows| {
                    for row in rows {
                        let Some(mut user) = decode_row::<RawUser>(row, &mut malformed) else {
                            continue;
                        };
                        if !is_recent(&user, since)
                            || !belongs_to_campus(&user, params.campus_id, endpoint)
                        {
                            continue;
                        }
                        if !seen.insert(user.id) {
                            continue;
                        }
                        user.source = Some(FetchSource::Activity);
                        if !known.contains(&user.id) {
                            new_users += 1;
                        }
                        users.push(user);
                        kept += 1;
                        if new_users >= room {
                            return PageControl::Stop;
                        }
                    }
                    PageControl::Continue
                })
                .await;

            tracing::debug!(
                endpoint = endpoint.label,
                pages = run.pages_fetched,
                rows = run.rows_seen,
                kept,
                "Activity endpoint done"
            );

            note_malformed(endpoint.label, malformed, report);
            self.after_run(token, &run, endpoint.label, report).await?;
            report.attempts.push(AttemptReport {
                strategy: FetchSource::Activity,
                endpoint: endpoint.label,
                pages: run.pages_fetched,
                rows_seen: run.rows_seen,
                rows_kept: kept,
                stop: run.stop,
            });
        }

        Ok(users)
    }

    /// Per-user detail fetch for the first `detail_limit` users.
    ///
    /// A 401 renews the token and retries that user once.
    async fn enrich(&self, token: &mut String, users: &mut [RawUser]) -> Result<usize> {
        let query = [("filter[cursus]".to_string(), "on".to_string())];
        let mut enriched = 0;
        for user in users.iter_mut().take(self.detail_limit) {
            let path = format!("/v2/users/{}", user.id);
            let mut result = self
                .client
                .get_json::<RawUser>(token.as_str(), &path, &query)
                .await;
            if matches!(result, Err(AppError::IntraUnauthorized)) {
                *token = self.refresh_token().await?;
                result = self
                    .client
                    .get_json::<RawUser>(token.as_str(), &path, &query)
                    .await;
            }
            match result {
                Ok(detail) if detail.id == user.id => {
                    user.merge_detail(detail);
                    enriched += 1;
                }
                Ok(detail) => {
                    tracing::warn!(
                        user_id = user.id,
                        returned_id = detail.id,
                        "Detail fetch returned another user"
                    );
                }
                Err(e) => {
                    tracing::debug!(user_id = user.id, error = %e, "Detail fetch failed");
                }
            }
        }
        Ok(enriched)
    }

    /// Bookkeeping after a paginated run: warnings and token renewal.
    async fn after_run(
        &self,
        token: &mut String,
        run: &PageRun,
        label: &str,
        report: &mut FetchReport,
    ) -> Result<()> {
        match &run.stop {
            StopReason::Failed(reason) => {
                tracing::warn!(endpoint = label, error = %reason, "Endpoint attempt failed");
                report
                    .warnings
                    .push(format!("{} failed: {}", label, reason));
            }
            StopReason::RateLimited => {
                tracing::warn!(endpoint = label, attempts = run.rate_limited, "Endpoint rate limited");
                report.warnings.push(format!(
                    "{} rate limited: no page received after {} attempt(s)",
                    label, run.rate_limited
                ));
            }
            _ if run.rate_limited > 0 => {
                tracing::warn!(endpoint = label, attempts = run.rate_limited, "Endpoint partly rate limited");
                report.warnings.push(format!(
                    "{} rate limited on {} page attempt(s); results may be incomplete",
                    label, run.rate_limited
                ));
            }
            _ => {}
        }
        if run.token_rejected() {
            *token = self.refresh_token().await?;
        }
        Ok(())
    }

    /// Drop a token the API rejected and get a new one.
    async fn refresh_token(&self) -> Result<String> {
        self.tokens.invalidate().await;
        self.tokens.token().await
    }
}

/// Decode one listing row, counting the ones that are not a record at all.
fn decode_row<T: DeserializeOwned>(row: Value, malformed: &mut usize) -> Option<T> {
    match serde_json::from_value(row) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable listing row");
            *malformed += 1;
            None
        }
    }
}

fn note_malformed(label: &str, malformed: usize, report: &mut FetchReport) {
    if malformed > 0 {
        tracing::warn!(endpoint = label, malformed, "Skipped malformed rows");
        report.malformed_rows += malformed;
    }
}

/// `candidate` parses and is later than `current` (or `current` does not parse).
fn is_later(candidate: Option<&str>, current: Option<&str>) -> bool {
    match (
        candidate.and_then(parse_timestamp),
        current.and_then(parse_timestamp),
    ) {
        (Some(new), Some(old)) => new > old,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Pages per activity endpoint: enough for `max_users`, capped.
fn activity_page_cap(max_users: usize, page_size: u32) -> u32 {
    let needed = max_users / page_size.max(1) as usize + 1;
    (needed.min(ACTIVITY_MAX_PAGES as usize)) as u32
}

/// The API's date filters are not trusted; re-check locally.
fn is_recent(user: &RawUser, since: DateTime<Utc>) -> bool {
    user.activity_timestamp().is_some_and(|ts| ts >= since)
}

fn belongs_to_campus(user: &RawUser, campus_id: u64, endpoint: &ActivityEndpoint) -> bool {
    match user.campus_ids() {
        Some(ids) => ids.contains(&campus_id),
        None => endpoint.accepts_unscoped_rows(),
    }
}

/// Merge two user lists by id, keeping `primary`'s order and entries.
///
/// On conflict the primary entry wins; fields it lacks are filled from the
/// secondary one. The result is cut to `max_users`.
pub fn merge_by_id(primary: Vec<RawUser>, secondary: Vec<RawUser>, max_users: usize) -> Vec<RawUser> {
    let mut merged: Vec<RawUser> = Vec::with_capacity(primary.len() + secondary.len());
    let mut index: HashMap<u64, usize> = HashMap::new();

    for user in primary.into_iter().chain(secondary) {
        match index.get(&user.id) {
            Some(&pos) => merged[pos].fill_missing_from(user),
            None => {
                index.insert(user.id, merged.len());
                merged.push(user);
            }
        }
    }

    merged.truncate(max_users);
    merged
}
