//! Relay integration tests against a scripted upstream.
//!
//! Tests verify:
//! - Byte-for-byte relay of body and content type
//! - Exactly one outbound call per valid request, to the expected URL
//! - Path rejection without outbound calls
//! - Status propagation and retry policy at the HTTP boundary
//! - The credential never reaches the client

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use tower::ServiceExt;

use tile_relay::error::UpstreamError;

use super::test_utils::{
    expected_mock_url, get_collected, mock_router, mock_router_with_retry, MockRoute,
    MockUpstream, PNG_BYTES, TEST_API_KEY,
};

const TILE: &str = "global_monthly_2024_08_mosaic/gmap/10/330/553.png";

// =============================================================================
// Successful Relay
// =============================================================================

#[tokio::test]
async fn test_tile_relayed_byte_for_byte() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, PNG_BYTES));
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("image/png"));
    assert_eq!(&response.body[..], PNG_BYTES);
}

#[tokio::test]
async fn test_exactly_one_outbound_call_to_expected_url() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, PNG_BYTES));
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;
    assert_eq!(response.status, StatusCode::OK);

    let calls = upstream.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].as_str(), expected_mock_url(TILE));
}

#[tokio::test]
async fn test_credential_not_echoed() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, PNG_BYTES));
    let router = mock_router(Arc::clone(&upstream));

    let ok = get_collected(&router, &format!("/tiles/{}", TILE)).await;
    assert!(!ok.leaks(TEST_API_KEY));

    let missing = get_collected(&router, "/tiles/other_mosaic/gmap/1/1/1.png").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(!missing.leaks(TEST_API_KEY));

    let rejected = get_collected(&router, "/tiles/a%3Fb").await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert!(!rejected.leaks(TEST_API_KEY));
}

#[tokio::test]
async fn test_non_png_content_type_preserved() {
    let upstream = Arc::new(MockUpstream::new().with_route(
        "mosaic/gmap/1/2/3.jpg",
        MockRoute::Respond {
            status: 200,
            content_type: Some("image/jpeg"),
            body: Bytes::from_static(b"\xff\xd8\xff\xe0jpeg"),
        },
    ));
    let router = mock_router(upstream);

    let response = get_collected(&router, "/tiles/mosaic/gmap/1/2/3.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("image/jpeg"));
    assert_eq!(&response.body[..], b"\xff\xd8\xff\xe0jpeg");
}

#[tokio::test]
async fn test_inbound_query_not_forwarded() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, PNG_BYTES));
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(
        &router,
        &format!("/tiles/{}?api_key=attacker&proxy=http://evil", TILE),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let calls = upstream.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].as_str(), expected_mock_url(TILE));
}

// =============================================================================
// Path Rejection
// =============================================================================

#[tokio::test]
async fn test_unsafe_paths_rejected_without_outbound_call() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, PNG_BYTES));
    let router = mock_router(Arc::clone(&upstream));

    for uri in [
        "/tiles/a%3Fapi_key%3Dx",
        "/tiles/mosaic%20name/1/2/3.png",
        "/tiles/mosaic/%2E%2E/secret",
        "/tiles/mosaic/1/2/3.png%23frag",
        "/tiles/mosaic/1/2/",
        "/tiles/mosaic//2/3.png",
        "/tiles/http:%2F%2Fevil.example%2Ftile.png",
    ] {
        let response = get_collected(&router, uri).await;
        assert_eq!(
            response.status,
            StatusCode::BAD_REQUEST,
            "expected 400 for {uri}"
        );
        assert_eq!(response.json()["error"], "invalid_tile_path");
    }

    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn test_rejection_is_idempotent() {
    let upstream = Arc::new(MockUpstream::new());
    let router = mock_router(Arc::clone(&upstream));

    let first = get_collected(&router, "/tiles/a%26b").await;
    let second = get_collected(&router, "/tiles/a%26b").await;

    assert_eq!(first.status, StatusCode::BAD_REQUEST);
    assert_eq!(first.status, second.status);
    assert_eq!(first.body, second.body);
    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn test_other_endpoints_not_served() {
    let upstream = Arc::new(MockUpstream::new());
    let router = mock_router(Arc::clone(&upstream));

    for uri in ["/", "/health", "/tile/a.png", "/tiles"] {
        let response = get_collected(&router, uri).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "expected 404 for {uri}");
    }

    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn test_post_not_allowed() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, PNG_BYTES));
    let router = mock_router(Arc::clone(&upstream));

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/tiles/{}", TILE))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(upstream.call_count(), 0);
}

// =============================================================================
// Status Propagation
// =============================================================================

#[tokio::test]
async fn test_upstream_404_propagated() {
    let upstream = Arc::new(MockUpstream::new());
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(&router, "/tiles/mosaic/gmap/1/2/3.png").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let json = response.json();
    assert_eq!(json["error"], "upstream_status");
    assert_eq!(json["status"], 404);
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn test_client_errors_not_retried() {
    for code in [400u16, 401, 403, 429] {
        let upstream = Arc::new(MockUpstream::new().with_status(TILE, code));
        let router = mock_router(Arc::clone(&upstream));

        let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

        assert_eq!(response.status.as_u16(), code);
        assert_eq!(upstream.call_count(), 1, "status {code} must not be retried");
        assert_ne!(&response.body[..], b"upstream says no");
    }
}

#[tokio::test]
async fn test_server_error_propagated() {
    let upstream = Arc::new(MockUpstream::new().with_status(TILE, 500));
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["error"], "upstream_status");
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn test_transient_failure_retried_once() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, PNG_BYTES).with_failures(
        TILE,
        1,
        UpstreamError::Connection("connection reset".into()),
    ));
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], PNG_BYTES);
    assert_eq!(upstream.call_count(), 2);
}

#[tokio::test]
async fn test_persistent_transient_failure_gives_up_after_one_retry() {
    let upstream = Arc::new(MockUpstream::new().with_route(
        TILE,
        MockRoute::Fail(UpstreamError::Timeout("deadline elapsed".into())),
    ));
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.json()["error"], "upstream_timeout");
    assert_eq!(upstream.call_count(), 2);
}

#[tokio::test]
async fn test_retry_disabled_makes_single_call() {
    let upstream = Arc::new(MockUpstream::new().with_route(
        TILE,
        MockRoute::Fail(UpstreamError::Connection("refused".into())),
    ));
    let router = mock_router_with_retry(Arc::clone(&upstream), false);

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json()["error"], "upstream_unreachable");
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn test_empty_success_is_not_a_200() {
    let upstream = Arc::new(MockUpstream::new().with_tile(TILE, Bytes::new()));
    let router = mock_router(Arc::clone(&upstream));

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json()["error"], "empty_upstream_body");
}

#[tokio::test]
async fn test_missing_content_type_falls_back() {
    let upstream = Arc::new(MockUpstream::new().with_route(
        TILE,
        MockRoute::Respond {
            status: 200,
            content_type: None,
            body: Bytes::from_static(PNG_BYTES),
        },
    ));
    let router = mock_router(upstream);

    let response = get_collected(&router, &format!("/tiles/{}", TILE)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("application/octet-stream"));
    assert_eq!(&response.body[..], PNG_BYTES);
}
