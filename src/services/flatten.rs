// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Raw user records to table rows.
//!
//! Every "missing field" decision lives here. Nothing in this module fails:
//! a record with holes yields a row with placeholders.

use crate::models::row::NOT_AVAILABLE;
use crate::models::{
    CampusField, CursusUser, PresenceStatus, RawUser, TimestampSource, UserRow,
};
use crate::time_utils::parse_timestamp;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use validator::Validate;

/// Curriculum whose level is shown when a user has several.
pub const PRIMARY_CURSUS: &str = "42cursus";

/// Flatten one raw record.
pub fn flatten_user(user: &RawUser) -> UserRow {
    let (last_activity, last_activity_source) = resolve_last_activity(user);

    UserRow {
        id: user.id,
        login: text_or_na(user.login.as_deref()),
        name: text_or_na(
            non_blank(user.displayname.as_deref()).or(non_blank(user.usual_full_name.as_deref())),
        ),
        status: if user.is_present() {
            PresenceStatus::OnCampus
        } else {
            PresenceStatus::RecentlyActive
        },
        level: resolve_level(user.cursus_users.as_deref().unwrap_or_default()),
        wallet: finite_or_zero(user.wallet),
        evaluation_points: finite_or_zero(user.correction_point),
        last_activity,
        last_activity_source,
        campus: resolve_campus(user.campus.as_ref()),
        fetched_via: user.source,
    }
}

/// Flatten a batch, one row per unique id (first occurrence wins).
pub fn flatten_all(users: &[RawUser]) -> Vec<UserRow> {
    let mut seen = HashSet::new();
    users
        .iter()
        .filter(|u| seen.insert(u.id))
        .map(flatten_user)
        .collect()
}

/// Primary curriculum level if enrolled, else the highest level; 2 decimals.
pub fn resolve_level(cursus_users: &[CursusUser]) -> f64 {
    let level_of = |c: &CursusUser| finite_or_zero(c.level);

    let primary = cursus_users.iter().find(|c| {
        c.cursus.as_ref().is_some_and(|info| {
            info.name.as_deref() == Some(PRIMARY_CURSUS) || info.slug.as_deref() == Some(PRIMARY_CURSUS)
        })
    });

    let level = match primary {
        Some(c) => level_of(c),
        None => cursus_users.iter().map(level_of).fold(0.0, f64::max),
    };
    (level * 100.0).round() / 100.0
}

/// Campus display name: first listed campus, or the single campus object.
pub fn resolve_campus(campus: Option<&CampusField>) -> String {
    let name = match campus {
        Some(CampusField::Many(list)) => list
            .first()
            .and_then(|c| c.as_ref())
            .and_then(|c| c.name.as_deref()),
        Some(CampusField::One(c)) => c.name.as_deref(),
        None => None,
    };
    text_or_na(name)
}

/// Live-location timestamp, else `updated_at`, else `created_at`.
///
/// Each candidate is only used when it parses.
pub fn resolve_last_activity(user: &RawUser) -> (Option<DateTime<Utc>>, TimestampSource) {
    let live = if user.location_active {
        user.last_location.as_deref()
    } else {
        None
    };

    [
        (live, TimestampSource::Location),
        (user.updated_at.as_deref(), TimestampSource::UpdatedAt),
        (user.created_at.as_deref(), TimestampSource::CreatedAt),
    ]
    .into_iter()
    .find_map(|(raw, source)| raw.and_then(parse_timestamp).map(|ts| (Some(ts), source)))
    .unwrap_or((None, TimestampSource::Unknown))
}

/// Rows active within `days_back` days of `now`, most recent first.
///
/// Rows with an unknown timestamp are dropped here; they still count in
/// [`flatten_all`]'s output.
pub fn within_window(rows: &[UserRow], now: DateTime<Utc>, days_back: u32) -> Vec<UserRow> {
    let since = now - Duration::days(i64::from(days_back));
    let mut windowed: Vec<UserRow> = rows
        .iter()
        .filter(|r| r.last_activity.is_some_and(|ts| ts >= since))
        .cloned()
        .collect();
    windowed.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    windowed
}

/// Table filters: search text, minimum level, status.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RowFilter {
    /// Case-insensitive substring of login or name.
    #[validate(length(max = 100))]
    pub search: Option<String>,
    #[validate(range(min = 0.0, max = 50.0))]
    pub min_level: Option<f64>,
    pub status: Option<PresenceStatus>,
}

impl RowFilter {
    pub fn matches(&self, row: &UserRow) -> bool {
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            if !row.login.to_lowercase().contains(&needle)
                && !row.name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(min) = self.min_level {
            if min > 0.0 && row.level < min {
                return false;
            }
        }
        if let Some(status) = self.status {
            if row.status != status {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, rows: &[UserRow]) -> Vec<UserRow> {
        rows.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

fn text_or_na(s: Option<&str>) -> String {
    non_blank(s).unwrap_or(NOT_AVAILABLE).to_string()
}

fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampusRef, CursusInfo};
    use serde_json::json;

    fn cursus(name: &str, level: f64) -> CursusUser {
        CursusUser {
            level: Some(level),
            cursus: Some(CursusInfo {
                name: Some(name.to_string()),
                slug: None,
            }),
        }
    }

    #[test]
    fn test_primary_cursus_wins_even_if_lower() {
        let level = resolve_level(&[cursus("42cursus", 3.2), cursus("other", 9.0)]);
        assert_eq!(level, 3.2);
    }

    #[test]
    fn test_max_level_without_primary() {
        let level = resolve_level(&[cursus("C Piscine", 4.5), cursus("other", 9.0)]);
        assert_eq!(level, 9.0);
        assert_eq!(resolve_level(&[]), 0.0);
    }

    #[test]
    fn test_primary_matched_by_slug_and_rounded() {
        let entry = CursusUser {
            level: Some(7.456),
            cursus: Some(CursusInfo {
                name: Some("Main".to_string()),
                slug: Some("42cursus".to_string()),
            }),
        };
        assert_eq!(resolve_level(&[cursus("other", 12.0), entry]), 7.46);
    }

    #[test]
    fn test_campus_resolution() {
        let list = CampusField::Many(vec![
            Some(CampusRef {
                id: Some(1),
                name: Some("Madrid".to_string()),
            }),
            Some(CampusRef {
                id: Some(2),
                name: Some("Paris".to_string()),
            }),
        ]);
        assert_eq!(resolve_campus(Some(&list)), "Madrid");

        let one = CampusField::One(CampusRef {
            id: Some(2),
            name: Some("Paris".to_string()),
        });
        assert_eq!(resolve_campus(Some(&one)), "Paris");
        assert_eq!(resolve_campus(Some(&CampusField::Many(vec![]))), "N/A");
        assert_eq!(resolve_campus(None), "N/A");
    }

    #[test]
    fn test_mistyped_nested_fields_fall_back_to_defaults() {
        let user: RawUser = serde_json::from_value(json!({
            "id": 1,
            "login": "jdoe",
            "cursus_users": [{"level": "3.2", "cursus": {"name": "42cursus"}}],
            "campus": ["garbage"]
        }))
        .unwrap();
        let row = flatten_user(&user);
        assert_eq!(row.login, "jdoe");
        assert_eq!(row.level, 0.0);
        assert_eq!(row.campus, "N/A");

        let user: RawUser = serde_json::from_value(json!({
            "id": 2,
            "campus": [{"id": 22, "name": "Madrid"}, "garbage"]
        }))
        .unwrap();
        assert_eq!(flatten_user(&user).campus, "Madrid");
    }

    #[test]
    fn test_last_activity_priority() {
        let mut user = RawUser {
            id: 1,
            updated_at: Some("2025-02-02T10:00:00Z".to_string()),
            created_at: Some("2024-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_last_activity(&user).1, TimestampSource::UpdatedAt);

        user.mark_present(Some("2025-02-03T08:30:00+01:00".to_string()));
        let (ts, source) = resolve_last_activity(&user);
        assert_eq!(source, TimestampSource::Location);
        assert_eq!(ts, parse_timestamp("2025-02-03T07:30:00Z"));

        user.last_location = Some("broken".to_string());
        assert_eq!(resolve_last_activity(&user).1, TimestampSource::UpdatedAt);

        user.updated_at = None;
        assert_eq!(resolve_last_activity(&user).1, TimestampSource::CreatedAt);

        user.created_at = Some("nope".to_string());
        assert_eq!(resolve_last_activity(&user), (None, TimestampSource::Unknown));
    }

    #[test]
    fn test_flatten_empty_record_uses_placeholders() {
        let user: RawUser = serde_json::from_value(json!({"id": 42})).unwrap();
        let row = flatten_user(&user);
        assert_eq!(row.login, "N/A");
        assert_eq!(row.name, "N/A");
        assert_eq!(row.campus, "N/A");
        assert_eq!(row.level, 0.0);
        assert_eq!(row.wallet, 0.0);
        assert_eq!(row.status, PresenceStatus::RecentlyActive);
        assert_eq!(row.last_activity, None);
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let user: RawUser = serde_json::from_value(json!({
            "id": 3,
            "login": "jdoe",
            "displayname": "Jane Doe",
            "wallet": 120,
            "correction_point": 4,
            "updated_at": "2025-02-02T10:00:00.123Z",
            "cursus_users": [{"level": 5.5, "cursus": {"name": "42cursus"}}],
            "campus": [{"id": 22, "name": "Madrid"}]
        }))
        .unwrap();

        let first = flatten_user(&user);
        let second = flatten_user(&user);
        assert_eq!(first, second);
        assert_eq!(first.name, "Jane Doe");
        assert_eq!(first.wallet, 120.0);
        assert_eq!(first.evaluation_points, 4.0);
        assert_eq!(first.level, 5.5);
        assert_eq!(first.campus, "Madrid");
    }

    #[test]
    fn test_flatten_all_dedups() {
        let users = vec![
            RawUser {
                id: 1,
                login: Some("a".to_string()),
                ..Default::default()
            },
            RawUser {
                id: 1,
                login: Some("b".to_string()),
                ..Default::default()
            },
            RawUser {
                id: 2,
                ..Default::default()
            },
        ];
        let rows = flatten_all(&users);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].login, "a");
    }

    #[test]
    fn test_window_drops_old_and_unknown() {
        let now = Utc::now();
        let mk = |id: u64, ts: Option<DateTime<Utc>>| UserRow {
            id,
            login: format!("u{}", id),
            name: NOT_AVAILABLE.to_string(),
            status: PresenceStatus::RecentlyActive,
            level: 0.0,
            wallet: 0.0,
            evaluation_points: 0.0,
            last_activity: ts,
            last_activity_source: TimestampSource::UpdatedAt,
            campus: NOT_AVAILABLE.to_string(),
            fetched_via: None,
        };
        let rows = vec![
            mk(1, Some(now - Duration::hours(30))),
            mk(2, Some(now - Duration::days(3))),
            mk(3, None),
            mk(4, Some(now - Duration::hours(1))),
        ];

        let windowed = within_window(&rows, now, 2);
        let ids: Vec<u64> = windowed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 1]);

        let since = now - Duration::days(2);
        assert!(windowed
            .iter()
            .all(|r| r.last_activity.is_some_and(|ts| ts >= since)));
    }

    #[test]
    fn test_row_filter() {
        let user: RawUser = serde_json::from_value(json!({
            "id": 3,
            "login": "jdoe",
            "displayname": "Jane Doe",
            "cursus_users": [{"level": 5.5, "cursus": {"name": "42cursus"}}]
        }))
        .unwrap();
        let row = flatten_user(&user);

        let by_name = RowFilter {
            search: Some("JANE".to_string()),
            ..Default::default()
        };
        assert!(by_name.matches(&row));

        let too_high = RowFilter {
            min_level: Some(6.0),
            ..Default::default()
        };
        assert!(!too_high.matches(&row));

        let on_campus = RowFilter {
            status: Some(PresenceStatus::OnCampus),
            ..Default::default()
        };
        assert!(!on_campus.matches(&row));

        let invalid = RowFilter {
            min_level: Some(60.0),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
