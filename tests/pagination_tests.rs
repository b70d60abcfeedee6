// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Page loop termination and 429 handling of the API client.

use axum::http::StatusCode;
use campus_tracker::error::AppError;
use campus_tracker::services::{PageControl, PageLimits, StopReason};
use common::{FakeIntra, FakeResponse, TEST_UNIT};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;

const LIMITS: PageLimits = PageLimits {
    page_size: 10,
    max_pages: 4,
};

fn rows(n: usize) -> Value {
    Value::Array((0..n).map(|i| json!({"id": i})).collect())
}

#[tokio::test]
async fn test_full_pages_run_until_cap() {
    let fake = FakeIntra::start(|req| FakeResponse::json(rows(req.page_size()))).await;
    let client = fake.client();

    let run = client
        .paginate("t", "/v2/things", &[], LIMITS, |_| PageControl::Continue)
        .await;

    assert_eq!(run.stop, StopReason::PageCap);
    assert_eq!(run.pages_fetched, 4);
    assert_eq!(run.rows_seen, 40);
    let pages: Vec<u32> = fake.requests().iter().map(|r| r.page()).collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_empty_and_short_pages_stop() {
    let fake = FakeIntra::start(|req| match req.page() {
        1 => FakeResponse::json(rows(10)),
        _ => FakeResponse::json(rows(0)),
    })
    .await;
    let run = fake
        .client()
        .paginate("t", "/v2/things", &[], LIMITS, |_| PageControl::Continue)
        .await;
    assert_eq!(run.stop, StopReason::Exhausted);
    assert_eq!(run.rows_seen, 10);

    let fake = FakeIntra::start(|_| FakeResponse::json(rows(3))).await;
    let run = fake
        .client()
        .paginate("t", "/v2/things", &[], LIMITS, |_| PageControl::Continue)
        .await;
    assert_eq!(run.stop, StopReason::ShortPage);
    assert_eq!(fake.requests().len(), 1);
}

#[tokio::test]
async fn test_callback_can_stop_early() {
    let fake = FakeIntra::start(|req| FakeResponse::json(rows(req.page_size()))).await;
    let mut seen = 0;

    let run = fake
        .client()
        .paginate("t", "/v2/things", &[], LIMITS, |page| {
            seen += page.len();
            if seen >= 15 {
                PageControl::Stop
            } else {
                PageControl::Continue
            }
        })
        .await;

    assert_eq!(run.stop, StopReason::Satisfied);
    assert_eq!(fake.requests().len(), 2);
}

#[tokio::test]
async fn test_retry_after_sleeps_once_then_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let fake = FakeIntra::start(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            FakeResponse::rate_limited(Some("5"))
        } else {
            FakeResponse::json(rows(2))
        }
    })
    .await;

    let run = fake
        .client()
        .paginate("t", "/v2/things", &[], LIMITS, |_| PageControl::Continue)
        .await;

    assert_eq!(run.stop, StopReason::ShortPage);
    assert_eq!(run.rows_seen, 2);

    let requests = fake.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].page(), 1);
    assert_eq!(requests[1].page(), 1);
    let waited = requests[1].at.duration_since(requests[0].at);
    assert!(waited >= TEST_UNIT * 5, "waited only {:?}", waited);
}

#[tokio::test]
async fn test_persistent_rate_limit_uses_page_attempts() {
    let fake = FakeIntra::start(|_| FakeResponse::rate_limited(Some("1"))).await;

    let run = fake
        .client()
        .paginate("t", "/v2/things", &[], LIMITS, |_| PageControl::Continue)
        .await;

    assert_eq!(run.stop, StopReason::RateLimited);
    assert_eq!(run.pages_fetched, 0);
    assert_eq!(run.rate_limited, 4);
    assert!(run.error.as_ref().is_some_and(AppError::is_rate_limited));
    // each of the 4 attempts is one request plus one retry
    assert_eq!(fake.requests().len(), 8);
    assert!(fake.requests().iter().all(|r| r.page() == 1));
}

#[tokio::test]
async fn test_rate_limit_after_first_page_hits_cap() {
    let fake = FakeIntra::start(|req| match req.page() {
        1 => FakeResponse::json(rows(req.page_size())),
        _ => FakeResponse::rate_limited(Some("1")),
    })
    .await;

    let run = fake
        .client()
        .paginate("t", "/v2/things", &[], LIMITS, |_| PageControl::Continue)
        .await;

    assert_eq!(run.stop, StopReason::PageCap);
    assert_eq!(run.pages_fetched, 1);
    assert_eq!(run.rate_limited, 3);
    assert!(run.error.is_none());
}

#[tokio::test]
async fn test_get_json_maps_errors() {
    let fake = FakeIntra::start(|req| match req.path.as_str() {
        "/forbidden" => FakeResponse::status(StatusCode::FORBIDDEN, json!({})),
        "/unauthorized" => FakeResponse::status(StatusCode::UNAUTHORIZED, json!({})),
        "/limited" => FakeResponse::rate_limited(None),
        "/broken" => FakeResponse::json(json!({"unexpected": true})),
        _ => FakeResponse::status(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "maintenance"})),
    })
    .await;
    let client = fake.client();

    let err = client.get_json::<Vec<Value>>("t", "/forbidden", &[]).await.unwrap_err();
    assert!(matches!(err, AppError::IntraForbidden(_)));

    let err = client.get_json::<Vec<Value>>("t", "/unauthorized", &[]).await.unwrap_err();
    assert!(matches!(err, AppError::IntraUnauthorized));

    let err = client.get_json::<Vec<Value>>("t", "/limited", &[]).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(fake.count("/limited"), 2);

    let err = client.get_json::<Vec<Value>>("t", "/broken", &[]).await.unwrap_err();
    assert!(matches!(err, AppError::IntraDecode(_)));

    let err = client.get_json::<Vec<Value>>("t", "/other", &[]).await.unwrap_err();
    assert!(matches!(
        &err,
        AppError::IntraStatus { status: 503, body } if body.contains("maintenance")
    ));
}
