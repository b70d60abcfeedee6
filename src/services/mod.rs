// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod campus;
pub mod fetcher;
pub mod flatten;
pub mod intra;
pub mod retry;
pub mod snapshot;
pub mod token;

pub use campus::CampusDirectory;
pub use fetcher::{ActiveUserFetcher, FetchOutcome, FetchParams, FetchReport, SearchMethod};
pub use flatten::{flatten_all, flatten_user, within_window, RowFilter};
pub use intra::{IntraClient, PageControl, PageLimits, PageRun, StopReason};
pub use retry::RetryPolicy;
pub use snapshot::{Snapshot, SnapshotStore};
pub use token::{Credentials, TokenProvider};
