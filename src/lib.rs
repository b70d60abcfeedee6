// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Campus-Tracker: who is active on a 42 campus right now
//!
//! This crate provides the backend API behind the active-user dashboard:
//! it authenticates against the campus API, lists campuses, collects the
//! users active on a campus and flattens them into table rows.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use error::AppError;
use services::{
    ActiveUserFetcher, CampusDirectory, Credentials, IntraClient, SnapshotStore, TokenProvider,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub tokens: Arc<TokenProvider>,
    pub directory: CampusDirectory,
    pub fetcher: ActiveUserFetcher,
    pub snapshots: SnapshotStore,
}

impl AppState {
    /// Build every service from configuration.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let client = IntraClient::new(
            &config.intra_api_url,
            &config.intra_token_url,
            &config.fetch,
        )?;
        Self::with_client(config, client)
    }

    /// Build every service around an existing client.
    ///
    /// Credentials are checked here, before anything touches the network.
    pub fn with_client(config: Config, client: IntraClient) -> Result<Self, AppError> {
        let credentials = Credentials::new(&config.intra_client_id, &config.intra_client_secret)?;
        let tokens = Arc::new(TokenProvider::new(client.clone(), credentials));

        Ok(Self {
            directory: CampusDirectory::new(client.clone(), tokens.clone(), &config.fetch),
            fetcher: ActiveUserFetcher::new(client, tokens.clone(), &config.fetch),
            snapshots: SnapshotStore::new(config.fetch.auto_refresh_interval),
            tokens,
            config,
        })
    }
}
