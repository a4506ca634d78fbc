//! Outpost integration test harness.
//!
//! Tests run against a real dispatcher on loopback TCP. The cloud bridge
//! handle is just an mpsc pair, so each test holds the receiving side and
//! observes exactly the publications that would have gone to the broker —
//! no MQTT infrastructure required.
//!
//! Every test builds its own dispatcher (port 0) and its own gate state, so
//! tests are independent and can run in parallel.

mod cloud;
mod dispatch;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use outpost_core::Message;
use outpost_services::{
    BridgeHandle, DetectGate, DetectLog, Dispatcher, FileUploader, MessageRouter, Publication,
};

// ── Harness ───────────────────────────────────────────────────────────────────

/// A dispatcher under test plus the seams the tests observe.
pub struct Harness {
    pub addr: SocketAddr,
    /// Everything the handlers publish toward the cloud lands here.
    pub outbound: mpsc::UnboundedReceiver<Publication>,
    pub log: DetectLog,
    pub shutdown: broadcast::Sender<()>,
    pub task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

/// Start a dispatcher on an ephemeral loopback port with a fresh router.
pub async fn start_dispatcher() -> Harness {
    let (bridge, outbound) = BridgeHandle::channel();
    let log = DetectLog::new();
    let router = Arc::new(MessageRouter::new(
        DetectGate::new("Boston"),
        log.clone(),
        bridge,
        FileUploader::new(std::env::temp_dir().join("outpost-it-uploads")),
        "outpost-it",
        "Boston",
    ));

    let (shutdown, _) = broadcast::channel(1);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test dispatcher");
    let dispatcher = Dispatcher::new(listener, router, shutdown.subscribe());
    let addr = dispatcher.local_addr().expect("dispatcher has no local addr");
    let task = tokio::spawn(dispatcher.run());

    Harness {
        addr,
        outbound,
        log,
        shutdown,
        task,
    }
}

pub async fn connect(addr: SocketAddr) -> BufReader<TcpStream> {
    BufReader::new(
        TcpStream::connect(addr)
            .await
            .expect("failed to connect to dispatcher"),
    )
}

/// Write one raw frame, then read back exactly one framed response.
pub async fn round_trip_raw(conn: &mut BufReader<TcpStream>, frame: &[u8]) -> Vec<u8> {
    conn.get_mut().write_all(frame).await.expect("write failed");
    let mut response = Vec::new();
    let read = conn
        .read_until(b'\n', &mut response)
        .await
        .expect("read failed");
    assert!(read > 0, "dispatcher closed the connection");
    response
}

// ── Smoke test ────────────────────────────────────────────────────────────────

/// A producer speaking the documented wire format by hand — no codec types —
/// must be understood by the dispatcher.
#[tokio::test]
async fn wire_format_accepts_hand_built_json() {
    let mut harness = start_dispatcher().await;
    let mut conn = connect(harness.addr).await;

    let mut frame = serde_json::json!({
        "kind": "predictions",
        "probabilities": [0.0, 0.9, 0.05, 0.05],
        "timestamp": 123.0,
    })
    .to_string()
    .into_bytes();
    frame.push(b'\n');

    let raw = round_trip_raw(&mut conn, &frame).await;
    let response = Message::from_bytes(&raw).expect("well-formed response");
    assert!(matches!(response, Message::ModelResponse { uid: Some(_) }));

    let publication = harness.outbound.try_recv().expect("detect was published");
    assert_eq!(publication.topic, "dev/detect");
}
