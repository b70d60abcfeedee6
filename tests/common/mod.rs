// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process fake of the campus API.
//!
//! Each test supplies a responder closure; the fake records every request it
//! sees so tests can assert on counts, page numbers and timing.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use campus_tracker::config::{Config, FetchSettings};
use campus_tracker::services::{Credentials, IntraClient, RetryPolicy, TokenProvider};
use campus_tracker::AppState;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time unit standing in for one second of Retry-After in tests.
pub const TEST_UNIT: Duration = Duration::from_millis(10);

/// One request received by the fake.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub authorization: Option<String>,
    pub body: String,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn page(&self) -> u32 {
        self.param("page[number]")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1)
    }

    pub fn page_size(&self) -> usize {
        self.param("page[size]")
            .and_then(|p| p.parse().ok())
            .unwrap_or(100)
    }
}

/// Response the fake sends back.
pub struct FakeResponse {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Value,
}

impl FakeResponse {
    pub fn json(body: Value) -> Self {
        Self::status(StatusCode::OK, body)
    }

    pub fn status(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    pub fn rate_limited(retry_after: Option<&'static str>) -> Self {
        let response = Self::status(StatusCode::TOO_MANY_REQUESTS, json!({"error": "slow down"}));
        match retry_after {
            Some(value) => response.with_header("retry-after", value),
            None => response,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
        self
    }

    pub fn token(access_token: &str) -> Self {
        Self::json(json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 7200,
            "scope": "public",
        }))
    }
}

impl IntoResponse for FakeResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        for (name, value) in self.headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

type Responder = dyn Fn(&RecordedRequest) -> FakeResponse + Send + Sync;

struct FakeState {
    requests: Mutex<Vec<RecordedRequest>>,
    responder: Box<Responder>,
}

/// A running fake API server.
pub struct FakeIntra {
    pub base_url: String,
    state: Arc<FakeState>,
}

impl FakeIntra {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> FakeResponse + Send + Sync + 'static,
    {
        let state = Arc::new(FakeState {
            requests: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake API");
        let addr = listener.local_addr().expect("fake API address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    /// Settings tuned for tests.
    pub fn settings(&self) -> FetchSettings {
        FetchSettings {
            http_timeout: Duration::from_secs(5),
            ..FetchSettings::default()
        }
    }

    /// Client against this fake with millisecond retry units.
    pub fn client(&self) -> IntraClient {
        self.client_with(&self.settings())
    }

    pub fn client_with(&self, settings: &FetchSettings) -> IntraClient {
        let fallback = settings.default_retry_after;
        IntraClient::new(&self.base_url, &self.token_url(), settings)
            .expect("build client")
            .with_retry_policies(
                RetryPolicy::api(fallback).with_time_unit(TEST_UNIT),
                RetryPolicy::token(fallback).with_time_unit(TEST_UNIT),
            )
    }

    pub fn token_provider(&self) -> Arc<TokenProvider> {
        let credentials = Credentials::new("test_client_id", "test_secret").expect("credentials");
        Arc::new(TokenProvider::new(self.client(), credentials))
    }

    pub fn config(&self) -> Config {
        Config {
            intra_api_url: self.base_url.clone(),
            intra_token_url: self.token_url(),
            fetch: self.settings(),
            ..Config::default()
        }
    }

    /// Full application state against this fake.
    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState::with_client(self.config(), self.client()).expect("app state"))
    }
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> FakeResponse {
    let request = RecordedRequest {
        method,
        path: uri.path().to_string(),
        query,
        authorization: headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
        at: Instant::now(),
    };
    let response = (state.responder)(&request);
    state.requests.lock().unwrap().push(request);
    response
}

// ─── Canned payloads ─────────────────────────────────────────

/// RFC 3339 timestamp `hours` ago.
pub fn hours_ago(hours: i64) -> String {
    (chrono::Utc::now() - chrono::Duration::hours(hours)).to_rfc3339()
}

pub fn campus_json(id: u64, name: &str, country: &str) -> Value {
    json!({"id": id, "name": name, "country": country, "city": name})
}

/// A user summary as listed by the users endpoints.
pub fn user_json(id: u64, campus_id: u64, updated_hours_ago: i64) -> Value {
    json!({
        "id": id,
        "login": format!("user{}", id),
        "displayname": format!("User {}", id),
        "wallet": 10,
        "correction_point": 3,
        "location": null,
        "updated_at": hours_ago(updated_hours_ago),
        "created_at": "2020-01-01T00:00:00.000Z",
        "campus": [{"id": campus_id, "name": "Test Campus"}],
    })
}

/// An open location session embedding a minimal user.
pub fn location_json(id: u64, user_id: u64, begun_hours_ago: i64) -> Value {
    json!({
        "id": id,
        "begin_at": hours_ago(begun_hours_ago),
        "end_at": null,
        "host": format!("c1r1s{}", id),
        "user": {
            "id": user_id,
            "login": format!("user{}", user_id),
            "location": format!("c1r1s{}", id),
        },
    })
}

/// Slice of `rows` for a request's page, honoring `page[size]`.
pub fn page_of(rows: &[Value], request: &RecordedRequest) -> Value {
    let size = request.page_size();
    let start = (request.page() as usize - 1) * size;
    let page: Vec<Value> = rows.iter().skip(start).take(size).cloned().collect();
    Value::Array(page)
}

// ─── Standard campus scenario ────────────────────────────────

pub const CAMPUS_ID: u64 = 22;

/// Campus 22 with 10 open sessions (users 1..=10) and 15 recently updated
/// users (7..=21), so 4 users appear in both.
pub fn campus_scenario() -> impl Fn(&RecordedRequest) -> FakeResponse + Send + Sync + 'static {
    let campuses = vec![
        campus_json(21, "Paris", "France"),
        campus_json(CAMPUS_ID, "Madrid", "Spain"),
        campus_json(37, "Malaga", "Spain"),
        campus_json(1, "Lyon", "France"),
        campus_json(12, "Tokyo", "Japan"),
    ];
    let locations: Vec<Value> = (1..=10).map(|i| location_json(100 + i, i, 1)).collect();
    let active: Vec<Value> = (7..=21).map(|i| user_json(i, CAMPUS_ID, 2)).collect();

    move |req: &RecordedRequest| {
        let path = req.path.as_str();
        match path {
            "/oauth/token" => FakeResponse::token("test-token"),
            "/v2/campus" => FakeResponse::json(page_of(&campuses, req)),
            "/v2/campus/22/locations" => FakeResponse::json(page_of(&locations, req)),
            "/v2/users" | "/v2/campus/22/users" => FakeResponse::json(page_of(&active, req)),
            _ => match path.strip_prefix("/v2/users/").and_then(|id| id.parse::<u64>().ok()) {
                Some(id) => {
                    let mut detail = user_json(id, CAMPUS_ID, 2);
                    detail["cursus_users"] = json!([
                        {"level": 3.2, "cursus": {"name": "42cursus", "slug": "42cursus"}},
                        {"level": 9.0, "cursus": {"name": "C Piscine", "slug": "c-piscine"}},
                    ]);
                    FakeResponse::json(detail)
                }
                None => FakeResponse::status(StatusCode::NOT_FOUND, json!({})),
            },
        }
    }
}
