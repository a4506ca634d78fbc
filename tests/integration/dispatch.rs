//! Dispatcher behavior over real loopback connections: resilience to bad
//! frames, debounce semantics end to end, and the many-connections race.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio::time::timeout;

use outpost_core::Message;

use crate::{connect, round_trip_raw, start_dispatcher};

fn predictions(probabilities: Vec<f64>, timestamp: f64) -> Message {
    Message::Predictions {
        probabilities,
        timestamp,
    }
}

/// One malformed frame followed by a well-formed one on the same
/// connection: exactly one handled message, no disconnect.
#[tokio::test]
async fn malformed_frame_does_not_drop_connection() {
    let mut harness = start_dispatcher().await;
    let mut conn = connect(harness.addr).await;

    conn.get_mut()
        .write_all(b"this is not a message\n")
        .await
        .unwrap();

    let msg = predictions(vec![0.0, 0.9, 0.05, 0.05], 50.0);
    let raw = round_trip_raw(&mut conn, &msg.to_frame()).await;
    let response = Message::from_bytes(&raw).unwrap();
    assert!(matches!(response, Message::ModelResponse { uid: Some(_) }));

    // The garbage frame produced nothing; the valid one produced one publish.
    assert!(harness.outbound.try_recv().is_ok());
    assert!(harness.outbound.try_recv().is_err());
}

/// A known kind with a missing required field is also just a dropped frame.
#[tokio::test]
async fn incomplete_message_is_dropped_not_fatal() {
    let mut harness = start_dispatcher().await;
    let mut conn = connect(harness.addr).await;

    conn.get_mut()
        .write_all(b"{\"kind\":\"predictions\",\"timestamp\":1.0}\n")
        .await
        .unwrap();

    let msg = predictions(vec![0.0, 0.9, 0.05, 0.05], 50.0);
    let raw = round_trip_raw(&mut conn, &msg.to_frame()).await;
    assert!(Message::from_bytes(&raw).is_ok());
    assert_eq!(harness.log.len(), 1);
}

/// Debounce across one connection: t and t+0.5 merge, the next gap ≥ 1 s
/// publishes again.
#[tokio::test]
async fn debounce_merges_within_window_only() {
    let mut harness = start_dispatcher().await;
    let mut conn = connect(harness.addr).await;

    let raw = round_trip_raw(&mut conn, &predictions(vec![0.0, 0.9, 0.0, 0.0], 100.0).to_frame())
        .await;
    assert!(matches!(
        Message::from_bytes(&raw).unwrap(),
        Message::ModelResponse { uid: Some(_) }
    ));

    let raw = round_trip_raw(&mut conn, &predictions(vec![0.0, 0.8, 0.1, 0.0], 100.5).to_frame())
        .await;
    assert!(matches!(
        Message::from_bytes(&raw).unwrap(),
        Message::ModelResponse { uid: None }
    ));

    let raw = round_trip_raw(&mut conn, &predictions(vec![0.0, 0.9, 0.0, 0.0], 101.5).to_frame())
        .await;
    assert!(matches!(
        Message::from_bytes(&raw).unwrap(),
        Message::ModelResponse { uid: Some(_) }
    ));

    let mut publishes = 0;
    while harness.outbound.try_recv().is_ok() {
        publishes += 1;
    }
    assert_eq!(publishes, 2);
}

/// Fifty concurrent connections, all the same class inside the window:
/// exactly one publish, and every connection gets a well-formed response.
#[tokio::test]
async fn fifty_connections_in_window_publish_once() {
    let mut harness = start_dispatcher().await;

    let mut tasks = JoinSet::new();
    for i in 0..50usize {
        let addr = harness.addr;
        tasks.spawn(async move {
            let mut conn = connect(addr).await;
            // Distinct vectors, same winning class, same instant.
            let msg = predictions(vec![0.0, 0.6 + (i as f64) * 0.001, 0.1, 0.1], 500.0);
            let raw = round_trip_raw(&mut conn, &msg.to_frame()).await;
            Message::from_bytes(&raw).expect("well-formed model-response")
        });
    }

    let mut responses = 0;
    let mut with_uid = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("connection task panicked") {
            Message::ModelResponse { uid } => {
                responses += 1;
                if uid.is_some() {
                    with_uid += 1;
                }
            }
            other => panic!("unexpected response kind: {}", other.kind()),
        }
    }

    assert_eq!(responses, 50);
    assert_eq!(with_uid, 1, "exactly one connection wins the publish");
    assert!(harness.outbound.try_recv().is_ok());
    assert!(harness.outbound.try_recv().is_err(), "no duplicate publish");
}

/// Query the detect log over the wire after publishing through it.
#[tokio::test]
async fn query_round_trip_over_tcp() {
    let mut harness = start_dispatcher().await;
    let mut conn = connect(harness.addr).await;

    let raw = round_trip_raw(&mut conn, &predictions(vec![0.0, 0.0, 0.9, 0.1], 42.0).to_frame())
        .await;
    let Message::ModelResponse { uid: Some(uid) } = Message::from_bytes(&raw).unwrap() else {
        panic!("expected a published event");
    };

    let query = Message::QueryRequest {
        detect_id: uid.clone(),
        prefix: None,
    };
    let raw = round_trip_raw(&mut conn, &query.to_frame()).await;
    let Message::QueryResponse { results } = Message::from_bytes(&raw).unwrap() else {
        panic!("expected a query-response");
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.uid, uid);
    assert_eq!(results[0].detect_type, "assault");
}

/// Shutdown must unblock parked accepts and parked connection reads.
#[tokio::test]
async fn shutdown_terminates_run_with_open_connections() {
    let harness = start_dispatcher().await;
    let _idle = connect(harness.addr).await;

    harness.shutdown.send(()).unwrap();
    let result = timeout(Duration::from_secs(5), harness.task)
        .await
        .expect("dispatcher did not shut down")
        .expect("dispatcher task panicked");
    assert!(result.is_ok());
}
