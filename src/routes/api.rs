// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JSON API consumed by the dashboard UI.

use crate::error::{AppError, Result};
use crate::models::campus::{country_counts, group_by_country};
use crate::models::{Campus, DashboardSummary, PresenceStatus, RawUser, UserRow};
use crate::services::fetcher::{FetchParams, FetchReport, SearchMethod};
use crate::services::flatten::{flatten_all, within_window, RowFilter};
use crate::services::snapshot::Snapshot;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Lookback window bounds, in days.
pub const DAYS_BACK_RANGE: (u32, u32) = (1, 30);
/// Result cap bounds.
pub const MAX_USERS_RANGE: (usize, usize) = (20, 500);
/// Minimum-level filter bounds.
pub const MIN_LEVEL_RANGE: (f64, f64) = (0.0, 50.0);
/// Raw records included when `raw=true`.
const RAW_PREVIEW: usize = 3;
/// Countries listed in the campus statistics.
const TOP_COUNTRIES: usize = 5;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/settings", get(get_settings))
        .route("/api/campuses", get(get_campuses))
        .route(
            "/api/campuses/{campus_id}/active-users",
            get(get_active_users),
        )
        .route("/api/cache/clear", post(clear_cache))
}

// ─── Settings ────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SettingsResponse {
    pub default_days_back: u32,
    pub default_max_users: usize,
    pub days_back_range: (u32, u32),
    pub max_users_range: (usize, usize),
    pub min_level_range: (f64, f64),
    pub search_methods: Vec<String>,
    pub default_search_method: String,
    pub auto_refresh_interval_secs: u64,
    pub detail_limit: usize,
}

/// Defaults and bounds for the sidebar controls.
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let fetch = &state.config.fetch;
    Json(SettingsResponse {
        default_days_back: fetch.default_days_back,
        default_max_users: fetch.default_max_users,
        days_back_range: DAYS_BACK_RANGE,
        max_users_range: MAX_USERS_RANGE,
        min_level_range: MIN_LEVEL_RANGE,
        search_methods: SearchMethod::ALL
            .iter()
            .map(|m| m.as_str().to_string())
            .collect(),
        default_search_method: SearchMethod::default().to_string(),
        auto_refresh_interval_secs: fetch.auto_refresh_interval.as_secs(),
        detail_limit: fetch.detail_limit,
    })
}

// ─── Campuses ────────────────────────────────────────────────

#[derive(Deserialize)]
struct CampusesQuery {
    /// Only list campuses of this country (case-insensitive)
    country: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CountryGroup {
    pub country: String,
    pub campuses: Vec<Campus>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CountryCount {
    pub country: String,
    pub campuses: usize,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CampusesResponse {
    pub total_campuses: usize,
    pub total_countries: usize,
    pub countries: Vec<CountryGroup>,
    pub top_countries: Vec<CountryCount>,
}

/// Campus directory grouped by country, plus global statistics.
///
/// The statistics always cover every campus; `country` only narrows the
/// grouped list.
async fn get_campuses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CampusesQuery>,
) -> Result<Json<CampusesResponse>> {
    let campuses = state.directory.campuses().await?;
    let counts = country_counts(&campuses);

    let wanted = params
        .country
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase);

    let countries: Vec<CountryGroup> = group_by_country(&campuses)
        .into_iter()
        .filter(|(country, _)| {
            wanted
                .as_deref()
                .is_none_or(|w| country.to_lowercase() == w)
        })
        .map(|(country, campuses)| CountryGroup { country, campuses })
        .collect();

    if let Some(wanted) = wanted {
        if countries.is_empty() {
            return Err(AppError::NotFound(format!("No campuses in country '{}'", wanted)));
        }
    }

    Ok(Json(CampusesResponse {
        total_campuses: campuses.len(),
        total_countries: counts.len(),
        countries,
        top_countries: counts
            .into_iter()
            .take(TOP_COUNTRIES)
            .map(|(country, campuses)| CountryCount { country, campuses })
            .collect(),
    }))
}

// ─── Active Users ────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
struct ActiveUsersQuery {
    /// Lookback window in days
    #[validate(range(min = 1, max = 30))]
    days_back: Option<u32>,
    /// Result cap
    #[validate(range(min = 20, max = 500))]
    max_users: Option<usize>,
    method: Option<SearchMethod>,
    /// Ignore a fresh snapshot and fetch again
    #[serde(default)]
    refresh: bool,
    #[validate(length(max = 100))]
    search: Option<String>,
    #[validate(range(min = 0.0, max = 50.0))]
    min_level: Option<f64>,
    status: Option<PresenceStatus>,
    /// Include the first raw records
    #[serde(default)]
    raw: bool,
    /// Include the fetch report
    #[serde(default)]
    debug: bool,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActiveUsersResponse {
    pub campus: Campus,
    pub days_back: u32,
    pub max_users: usize,
    pub method: String,
    /// Rows inside the window, after the table filters.
    pub rows: Vec<UserRow>,
    /// Rows inside the window, before the table filters.
    pub total_rows: usize,
    /// Unique users fetched, including those with no usable timestamp.
    pub fetched_users: usize,
    /// Metrics over the windowed rows.
    pub summary: DashboardSummary,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub last_updated: DateTime<Utc>,
    /// Served from a snapshot younger than the auto-refresh interval.
    pub from_cache: bool,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "Array<unknown> | null"))]
    pub raw: Option<Vec<RawUser>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown | null"))]
    pub report: Option<FetchReport>,
}

/// Active users of one campus, windowed and filtered for the table.
async fn get_active_users(
    State(state): State<Arc<AppState>>,
    Path(campus_id): Path<u64>,
    Query(params): Query<ActiveUsersQuery>,
) -> Result<Json<ActiveUsersResponse>> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let campus = state
        .directory
        .find(campus_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Campus {} not found", campus_id)))?;

    let fetch = &state.config.fetch;
    let fetch_params = FetchParams {
        campus_id,
        days_back: params.days_back.unwrap_or(fetch.default_days_back),
        max_users: params.max_users.unwrap_or(fetch.default_max_users),
        method: params.method.unwrap_or_default(),
    };

    tracing::debug!(
        campus_id,
        days_back = fetch_params.days_back,
        max_users = fetch_params.max_users,
        method = %fetch_params.method,
        refresh = params.refresh,
        "Active users requested"
    );

    let cached = if params.refresh {
        None
    } else {
        state.snapshots.get_fresh(&fetch_params)
    };
    let from_cache = cached.is_some();

    let snapshot = match cached {
        Some(snapshot) => snapshot,
        None => {
            let outcome = state.fetcher.fetch(&fetch_params).await?;
            state.snapshots.insert(Snapshot {
                rows: flatten_all(&outcome.users),
                params: fetch_params.clone(),
                raw: outcome.users,
                report: outcome.report,
                last_updated: Utc::now(),
            })
        }
    };

    let windowed = within_window(&snapshot.rows, Utc::now(), fetch_params.days_back);
    let filter = RowFilter {
        search: params.search,
        min_level: params.min_level,
        status: params.status,
    };
    let rows = filter.apply(&windowed);

    Ok(Json(ActiveUsersResponse {
        campus,
        days_back: fetch_params.days_back,
        max_users: fetch_params.max_users,
        method: fetch_params.method.to_string(),
        total_rows: windowed.len(),
        fetched_users: snapshot.rows.len(),
        summary: DashboardSummary::from_rows(&windowed),
        rows,
        last_updated: snapshot.last_updated,
        from_cache,
        warnings: snapshot.report.warnings.clone(),
        raw: params
            .raw
            .then(|| snapshot.raw.iter().take(RAW_PREVIEW).cloned().collect()),
        report: params.debug.then(|| snapshot.report.clone()),
    }))
}

// ─── Cache ───────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub snapshots_cleared: usize,
}

/// Forget the token, the campus list and every snapshot.
async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<ClearCacheResponse> {
    state.tokens.invalidate().await;
    state.directory.clear().await;
    let snapshots_cleared = state.snapshots.clear();

    tracing::info!(snapshots_cleared, "Caches cleared");

    Json(ClearCacheResponse {
        success: true,
        snapshots_cleared,
    })
}
