// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Dashboard aggregates computed from the flattened rows.
//!
//! These back the metric cards and chart series of the UI: the UI draws,
//! this module only counts.

use crate::models::UserRow;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Bins in the level histogram.
pub const LEVEL_HISTOGRAM_BINS: usize = 20;

/// Entries in the top-by-level ranking.
pub const TOP_USERS: usize = 10;

/// Metrics and chart series for one set of rows.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DashboardSummary {
    pub active_users: usize,
    pub unique_logins: usize,
    pub on_campus: usize,
    pub average_level: f64,
    pub max_level: f64,
    /// `None` when there are no rows to average.
    pub average_wallet: Option<f64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub first_activity: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub last_activity: Option<DateTime<Utc>>,
    /// Users per hour of day (UTC), index = hour.
    pub activity_by_hour: Vec<u32>,
    /// Users per calendar day (UTC).
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, number>"))]
    pub activity_by_day: BTreeMap<NaiveDate, u32>,
    pub level_histogram: Vec<HistogramBin>,
    pub top_by_level: Vec<RankedUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RankedUser {
    pub login: String,
    pub name: String,
    pub level: f64,
    pub wallet: f64,
}

impl DashboardSummary {
    pub fn from_rows(rows: &[UserRow]) -> Self {
        let n = rows.len();
        let unique_logins = rows
            .iter()
            .map(|r| r.login.as_str())
            .collect::<HashSet<_>>()
            .len();
        let on_campus = rows.iter().filter(|r| r.is_on_campus()).count();

        let (average_level, max_level, average_wallet) = if n == 0 {
            (0.0, 0.0, None)
        } else {
            let total_level: f64 = rows.iter().map(|r| r.level).sum();
            let total_wallet: f64 = rows.iter().map(|r| r.wallet).sum();
            let max_level = rows.iter().map(|r| r.level).fold(0.0_f64, f64::max);
            (
                total_level / n as f64,
                max_level,
                Some(total_wallet / n as f64),
            )
        };

        let timestamps: Vec<DateTime<Utc>> = rows.iter().filter_map(|r| r.last_activity).collect();

        let mut activity_by_hour = vec![0u32; 24];
        let mut activity_by_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for ts in &timestamps {
            activity_by_hour[ts.hour() as usize] += 1;
            *activity_by_day.entry(ts.date_naive()).or_insert(0) += 1;
        }

        Self {
            active_users: n,
            unique_logins,
            on_campus,
            average_level,
            max_level,
            average_wallet,
            first_activity: timestamps.iter().min().copied(),
            last_activity: timestamps.iter().max().copied(),
            activity_by_hour,
            activity_by_day,
            level_histogram: level_histogram(rows, max_level),
            top_by_level: top_by_level(rows),
        }
    }
}

/// Equal-width bins over `[0, max_level]`; empty when no one has a level.
fn level_histogram(rows: &[UserRow], max_level: f64) -> Vec<HistogramBin> {
    if max_level <= 0.0 {
        return Vec::new();
    }
    let width = max_level / LEVEL_HISTOGRAM_BINS as f64;
    let mut bins: Vec<HistogramBin> = (0..LEVEL_HISTOGRAM_BINS)
        .map(|i| HistogramBin {
            lower: width * i as f64,
            upper: width * (i + 1) as f64,
            count: 0,
        })
        .collect();
    for row in rows {
        let idx = ((row.level.max(0.0) / width) as usize).min(LEVEL_HISTOGRAM_BINS - 1);
        bins[idx].count += 1;
    }
    bins
}

fn top_by_level(rows: &[UserRow]) -> Vec<RankedUser> {
    let mut ranked: Vec<&UserRow> = rows.iter().collect();
    ranked.sort_by(|a, b| b.level.total_cmp(&a.level).then_with(|| a.login.cmp(&b.login)));
    ranked
        .into_iter()
        .take(TOP_USERS)
        .map(|r| RankedUser {
            login: r.login.clone(),
            name: r.name.clone(),
            level: r.level,
            wallet: r.wallet,
        })
        .collect()
}
