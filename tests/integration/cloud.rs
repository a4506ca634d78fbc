//! Cloud-originated request path: publications in, routed through the same
//! handlers, responses published back on the data-response topic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use outpost_core::message::topics;
use outpost_core::Message;
use outpost_services::{
    BridgeHandle, CloudWorker, DetectGate, DetectLog, FileUploader, MessageRouter, Publication,
};

struct CloudHarness {
    inbound: mpsc::UnboundedSender<Publication>,
    outbound: mpsc::UnboundedReceiver<Publication>,
    _shutdown: broadcast::Sender<()>,
}

fn start_cloud_worker() -> CloudHarness {
    let (bridge, outbound) = BridgeHandle::channel();
    let router = Arc::new(MessageRouter::new(
        DetectGate::new("Boston"),
        DetectLog::new(),
        bridge.clone(),
        FileUploader::new(std::env::temp_dir().join("outpost-it-cloud-uploads")),
        "outpost-it",
        "Boston",
    ));

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (shutdown, _) = broadcast::channel(1);
    let worker = CloudWorker::new(router, bridge, inbound_rx, shutdown.subscribe());
    tokio::spawn(worker.run());

    CloudHarness {
        inbound: inbound_tx,
        outbound,
        _shutdown: shutdown,
    }
}

fn request(topic: &str, message: &Message) -> Publication {
    Publication {
        topic: topic.to_string(),
        payload: message.to_bytes(),
    }
}

/// A file request for a file that does not exist locally maps to a 404
/// file-response on the data-response topic, with no upload attempted.
#[tokio::test]
async fn file_request_for_missing_file_publishes_404() {
    let mut harness = start_cloud_worker();

    let msg = Message::FileRequest {
        filename: "missing.mp4".to_string(),
        // Unroutable on purpose: a 404 proves no upload was attempted.
        upload_url: "http://192.0.2.1/upload".to_string(),
        headers: BTreeMap::new(),
    };
    harness
        .inbound
        .send(request(topics::DATA_REQUEST, &msg))
        .unwrap();

    let publication = timeout(Duration::from_secs(5), harness.outbound.recv())
        .await
        .expect("no response published")
        .expect("bridge closed");
    assert_eq!(publication.topic, topics::DATA_RESPONSE);
    assert_eq!(
        Message::from_bytes(&publication.payload).unwrap(),
        Message::FileResponse { status: 404 }
    );
}

/// An unparsable cloud payload is dropped; the worker keeps serving.
#[tokio::test]
async fn garbage_payload_does_not_kill_worker() {
    let mut harness = start_cloud_worker();

    harness
        .inbound
        .send(Publication {
            topic: topics::CONTROL.to_string(),
            payload: b"garbage".to_vec(),
        })
        .unwrap();

    let msg = Message::MetadataRequest {
        device_id: "outpost-it".to_string(),
    };
    harness
        .inbound
        .send(request(topics::CONTROL, &msg))
        .unwrap();

    let publication = timeout(Duration::from_secs(5), harness.outbound.recv())
        .await
        .expect("worker died on garbage")
        .expect("bridge closed");
    assert_eq!(publication.topic, topics::DATA_RESPONSE);
    let Message::MetadataResponse { metadata } =
        Message::from_bytes(&publication.payload).unwrap()
    else {
        panic!("expected a metadata-response");
    };
    assert_eq!(metadata.get("device_id").unwrap(), "outpost-it");
}

/// Cloud-bound kinds (here: a detect echoed back) produce no response.
#[tokio::test]
async fn cloud_bound_kinds_are_ignored() {
    let mut harness = start_cloud_worker();

    let msg = Message::DetectData {
        uid: "some-uid".to_string(),
    };
    harness
        .inbound
        .send(request(topics::CONTROL, &msg))
        .unwrap();

    // Follow with a request that does respond, proving order.
    let msg = Message::MetadataRequest {
        device_id: "outpost-it".to_string(),
    };
    harness
        .inbound
        .send(request(topics::CONTROL, &msg))
        .unwrap();

    let publication = timeout(Duration::from_secs(5), harness.outbound.recv())
        .await
        .expect("no response published")
        .expect("bridge closed");
    assert!(matches!(
        Message::from_bytes(&publication.payload).unwrap(),
        Message::MetadataResponse { .. }
    ));
    assert!(harness.outbound.try_recv().is_err());
}
