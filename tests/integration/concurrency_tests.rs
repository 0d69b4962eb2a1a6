//! Concurrency and cancellation tests.
//!
//! Tests verify:
//! - A slow upstream call does not hold up other in-flight tile requests
//! - Concurrent responses are not mixed up
//! - Dropping a request abandons its outbound call

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;

use super::test_utils::{get_collected, mock_router, MockUpstream};

const SLOW_TILE: &str = "mosaic/gmap/10/0/0.png";

fn tile_path(i: usize) -> String {
    format!("mosaic/gmap/10/{}/{}.png", i, i + 1)
}

fn tile_body(i: usize) -> Bytes {
    Bytes::from(format!("tile-body-{}", i))
}

#[tokio::test]
async fn test_slow_tile_does_not_delay_others() {
    const N: usize = 8;

    let mut upstream = MockUpstream::new()
        .with_tile(SLOW_TILE, Bytes::from_static(b"slow-body"))
        .with_delay(SLOW_TILE, Duration::from_secs(2));
    for i in 1..N {
        upstream = upstream.with_tile(&tile_path(i), tile_body(i));
    }
    let upstream = Arc::new(upstream);
    let router = mock_router(Arc::clone(&upstream));

    let slow = {
        let router = router.clone();
        tokio::spawn(async move { get_collected(&router, &format!("/tiles/{}", SLOW_TILE)).await })
    };

    let fast: Vec<_> = (1..N)
        .map(|i| {
            let router = router.clone();
            tokio::spawn(async move {
                let response = get_collected(&router, &format!("/tiles/{}", tile_path(i))).await;
                (i, response)
            })
        })
        .collect();

    for handle in fast {
        let (i, response) = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("fast tile held up by slow tile")
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, tile_body(i), "response for tile {i} corrupted");
    }

    assert!(!slow.is_finished());

    let response = slow.await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], b"slow-body");
    assert_eq!(upstream.call_count(), N);
}

#[tokio::test]
async fn test_failure_on_one_tile_does_not_affect_others() {
    let upstream = Arc::new(
        MockUpstream::new()
            .with_tile(&tile_path(1), tile_body(1))
            .with_status(&tile_path(2), 500)
            .with_tile(&tile_path(3), tile_body(3)),
    );
    let router = mock_router(Arc::clone(&upstream));

    let uris: Vec<String> = (1..=3)
        .map(|i| format!("/tiles/{}", tile_path(i)))
        .collect();

    let (a, b, c) = tokio::join!(
        get_collected(&router, &uris[0]),
        get_collected(&router, &uris[1]),
        get_collected(&router, &uris[2]),
    );

    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(a.body, tile_body(1));
    assert_eq!(b.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(c.status, StatusCode::OK);
    assert_eq!(c.body, tile_body(3));
}

#[tokio::test]
async fn test_dropped_request_cancels_outbound_call() {
    let upstream = Arc::new(
        MockUpstream::new()
            .with_tile(SLOW_TILE, Bytes::from_static(b"slow-body"))
            .with_delay(SLOW_TILE, Duration::from_secs(30)),
    );
    let router = mock_router(Arc::clone(&upstream));

    let request = {
        let router = router.clone();
        tokio::spawn(async move { get_collected(&router, &format!("/tiles/{}", SLOW_TILE)).await })
    };

    // Wait until the outbound call is in flight
    for _ in 0..100 {
        if upstream.call_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(upstream.call_count(), 1);

    // Client goes away
    request.abort();
    let _ = request.await;

    assert_eq!(upstream.cancelled_count(), 1);
    assert_eq!(upstream.call_count(), 1);
}
