// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Flattened user rows for the dashboard table.

use crate::models::FetchSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Placeholder for text fields the record did not carry.
pub const NOT_AVAILABLE: &str = "N/A";

/// Whether the user is physically on campus or only recently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    OnCampus,
    RecentlyActive,
}

/// Which timestamp the row's last activity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    Location,
    UpdatedAt,
    CreatedAt,
    Unknown,
}

/// One table row per unique user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserRow {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub login: String,
    pub name: String,
    pub status: PresenceStatus,
    pub level: f64,
    pub wallet: f64,
    pub evaluation_points: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub last_activity: Option<DateTime<Utc>>,
    pub last_activity_source: TimestampSource,
    pub campus: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub fetched_via: Option<FetchSource>,
}

impl UserRow {
    pub fn is_on_campus(&self) -> bool {
        self.status == PresenceStatus::OnCampus
    }
}
