// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod campus;
pub mod row;
pub mod summary;
pub mod user;

pub use campus::Campus;
pub use row::{PresenceStatus, TimestampSource, UserRow};
pub use summary::DashboardSummary;
pub use user::{CampusField, CampusRef, CursusInfo, CursusUser, FetchSource, LocationRecord, RawUser};
