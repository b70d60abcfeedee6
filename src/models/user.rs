// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Raw user records as returned by the campus API.
//!
//! The API is loose about which fields appear on which endpoint, so nearly
//! everything is optional here. Resolving "missing" into display defaults is
//! the flattener's job, not this module's. A field of the wrong shape reads
//! as missing; only a record without a usable `id` is rejected.

use crate::time_utils::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Host value the API uses for "not logged in anywhere".
const UNAVAILABLE_HOST: &str = "unavailable";

/// Which fetch strategy produced a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    Location,
    Activity,
}

/// A user record from `/v2/users`, `/v2/campus/{id}/users` or a location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUser {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub login: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub displayname: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub usual_full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub wallet: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub correction_point: Option<f64>,
    /// Current workstation host, when the user is logged in somewhere.
    #[serde(default, deserialize_with = "lenient")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<String>,
    /// Entries that are not objects are dropped.
    #[serde(default, deserialize_with = "lenient_list")]
    pub cursus_users: Option<Vec<CursusUser>>,
    #[serde(default, deserialize_with = "lenient_campus")]
    pub campus: Option<CampusField>,

    // ─── Annotations added by the fetcher ────────────────────────
    /// User holds an open location session.
    #[serde(default)]
    pub location_active: bool,
    /// `begin_at` of the open location session.
    #[serde(default, deserialize_with = "lenient")]
    pub last_location: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<FetchSource>,

    /// Everything else the API sent, kept for the raw-data inspector.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One curriculum enrollment with its progress level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursusUser {
    #[serde(default, deserialize_with = "lenient")]
    pub level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub cursus: Option<CursusInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursusInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub slug: Option<String>,
}

/// The `campus` field is a list on most endpoints and a single object on some.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CampusField {
    Many(Vec<Option<CampusRef>>),
    One(CampusRef),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampusRef {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

/// A workstation session from `/v2/campus/{id}/locations`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub begin_at: Option<String>,
    /// Any non-null value, even an empty string, closes the session.
    #[serde(default)]
    pub end_at: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub host: Option<String>,
    pub user: RawUser,
}

impl LocationRecord {
    /// Session still open (`end_at` absent or null).
    pub fn is_open(&self) -> bool {
        self.end_at.is_none()
    }
}

/// Read a field as `T`, or `None` when it has another shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Read a list keeping only the entries that are `T`.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| T::deserialize(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

/// A list of campus refs (unreadable entries become `None`) or one object.
fn lenient_campus<'de, D>(deserializer: D) -> Result<Option<CampusField>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(CampusField::Many(
            items
                .into_iter()
                .map(|item| CampusRef::deserialize(item).ok())
                .collect(),
        )),
        item @ Value::Object(_) => CampusRef::deserialize(item).ok().map(CampusField::One),
        _ => None,
    })
}

impl RawUser {
    /// Campus ids carried by the record, `None` when it has no campus info.
    pub fn campus_ids(&self) -> Option<Vec<u64>> {
        match self.campus.as_ref()? {
            CampusField::Many(list) => Some(
                list.iter()
                    .flatten()
                    .filter_map(|c| c.id)
                    .collect(),
            ),
            CampusField::One(c) => Some(c.id.into_iter().collect()),
        }
    }

    /// First parseable of `updated_at`, `created_at`.
    pub fn activity_timestamp(&self) -> Option<DateTime<Utc>> {
        [self.updated_at.as_deref(), self.created_at.as_deref()]
            .into_iter()
            .flatten()
            .find_map(parse_timestamp)
    }

    /// Whether the record says the user is physically on campus right now.
    pub fn is_present(&self) -> bool {
        self.location_active
            || self.location.as_deref().is_some_and(|host| {
                let host = host.trim();
                !host.is_empty() && host != UNAVAILABLE_HOST
            })
    }

    /// Mark the user as holding an open location that began at `begin_at`.
    pub fn mark_present(&mut self, begin_at: Option<String>) {
        self.location_active = true;
        self.last_location = begin_at;
        self.source = Some(FetchSource::Location);
    }

    /// Replace this record's API data with `detail`, keeping the fetcher's
    /// presence annotations.
    pub fn merge_detail(&mut self, detail: RawUser) {
        let location_active = self.location_active;
        let last_location = self.last_location.take();
        let source = self.source;
        *self = detail;
        self.location_active = location_active;
        self.last_location = last_location;
        self.source = source;
    }

    /// Fill fields this record lacks from another record of the same user.
    /// Presence annotations on `self` are left untouched.
    pub fn fill_missing_from(&mut self, other: RawUser) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.login, other.login);
        fill(&mut self.displayname, other.displayname);
        fill(&mut self.usual_full_name, other.usual_full_name);
        fill(&mut self.wallet, other.wallet);
        fill(&mut self.correction_point, other.correction_point);
        fill(&mut self.location, other.location);
        fill(&mut self.updated_at, other.updated_at);
        fill(&mut self.created_at, other.created_at);
        fill(&mut self.cursus_users, other.cursus_users);
        fill(&mut self.campus, other.campus);
        for (key, value) in other.extra {
            self.extra.entry(key).or_insert(value);
        }
    }
}
