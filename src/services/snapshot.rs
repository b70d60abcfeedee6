// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Last fetch per campus, reused until the auto-refresh interval passes.

use crate::models::{RawUser, UserRow};
use crate::services::fetcher::{FetchParams, FetchReport};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Result of one fetch, flattened and ready to serve.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub params: FetchParams,
    pub rows: Vec<UserRow>,
    pub raw: Vec<RawUser>,
    pub report: FetchReport,
    pub last_updated: DateTime<Utc>,
}

impl Snapshot {
    /// Younger than `max_age` as of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now - self.last_updated < max_age,
            Err(_) => true,
        }
    }
}

/// Snapshots keyed by campus id.
pub struct SnapshotStore {
    entries: DashMap<u64, Arc<Snapshot>>,
    max_age: Duration,
}

impl SnapshotStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    /// The stored snapshot for these exact parameters, if still fresh.
    pub fn get_fresh(&self, params: &FetchParams) -> Option<Arc<Snapshot>> {
        let entry = self.entries.get(&params.campus_id)?;
        if entry.params == *params && entry.is_fresh(Utc::now(), self.max_age) {
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Store a snapshot, replacing any previous one for the campus.
    pub fn insert(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.entries
            .insert(snapshot.params.campus_id, snapshot.clone());
        snapshot
    }

    /// Drop every snapshot; returns how many were held.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
