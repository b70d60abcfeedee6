// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Campus model and country grouping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Country label for campuses the API returns without one.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// A campus as listed by `/v2/campus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Campus {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl Campus {
    pub fn country_or_unknown(&self) -> &str {
        self.country
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(UNKNOWN_COUNTRY)
    }
}

/// Group campuses by country, each group sorted by campus name.
pub fn group_by_country(campuses: &[Campus]) -> BTreeMap<String, Vec<Campus>> {
    let mut grouped: BTreeMap<String, Vec<Campus>> = BTreeMap::new();
    for campus in campuses {
        grouped
            .entry(campus.country_or_unknown().to_string())
            .or_default()
            .push(campus.clone());
    }
    for group in grouped.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    grouped
}

/// Countries ordered by campus count (descending, then name).
pub fn country_counts(campuses: &[Campus]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for campus in campuses {
        *counts.entry(campus.country_or_unknown()).or_insert(0) += 1;
    }
    let mut ordered: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(country, n)| (country.to_string(), n))
        .collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ordered
}
