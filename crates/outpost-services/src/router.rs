//! Per-kind message handling.
//!
//! One explicit context owns everything a handler may touch: the dedup
//! gate, the detect log, the bridge publish handle, the uploader and the
//! device identity. `route` is the single entry point for both transports —
//! dispatcher connections and cloud-originated requests go through the same
//! table.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use outpost_core::message::topics;
use outpost_core::Message;

use crate::bridge::BridgeHandle;
use crate::detect_log::DetectLog;
use crate::gate::DetectGate;
use crate::upload::FileUploader;

pub struct MessageRouter {
    gate: DetectGate,
    log: DetectLog,
    bridge: BridgeHandle,
    uploader: FileUploader,
    device_id: String,
    location: String,
}

impl MessageRouter {
    pub fn new(
        gate: DetectGate,
        log: DetectLog,
        bridge: BridgeHandle,
        uploader: FileUploader,
        device_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            log,
            bridge,
            uploader,
            device_id: device_id.into(),
            location: location.into(),
        }
    }

    /// Handle one decoded message. The returned message, if any, belongs on
    /// the channel the request arrived on (the producer connection, or the
    /// data-response topic for cloud requests).
    pub async fn route(&self, message: Message) -> Option<Message> {
        match message {
            Message::Predictions {
                probabilities,
                timestamp,
            } => Some(self.handle_predictions(&probabilities, timestamp)),

            Message::FileRequest {
                filename,
                upload_url,
                headers,
            } => {
                self.handle_file_request(&filename, &upload_url, &headers)
                    .await;
                None
            }

            Message::MetadataRequest { device_id } => {
                Some(self.handle_metadata_request(&device_id))
            }

            Message::QueryRequest { detect_id, prefix } => Some(Message::QueryResponse {
                results: self.log.query(&detect_id, prefix.as_deref()),
            }),

            other => {
                // detect, detect-data, responses, send-push: those belong to
                // the cloud side of the channel.
                tracing::debug!(kind = other.kind(), "message is cloud-bound, ignoring");
                None
            }
        }
    }

    fn handle_predictions(&self, probabilities: &[f64], timestamp: f64) -> Message {
        tracing::info!(?probabilities, "received predictions");
        let uid = self.gate.evaluate(probabilities, timestamp).map(|event| {
            let uid = event.metadata.uid.clone();
            self.log.record(event.clone());
            self.bridge.publish(topics::DETECT, &Message::Detect(event));
            uid
        });
        Message::ModelResponse { uid }
    }

    async fn handle_file_request(
        &self,
        filename: &str,
        upload_url: &str,
        headers: &BTreeMap<String, String>,
    ) {
        let status = self.uploader.upload(filename, upload_url, headers).await;
        self.bridge
            .publish(topics::DATA_RESPONSE, &Message::FileResponse { status });
    }

    fn handle_metadata_request(&self, requested: &str) -> Message {
        tracing::debug!(requested, "metadata requested");
        let mut metadata = BTreeMap::new();
        metadata.insert("device_id".to_string(), self.device_id.clone());
        metadata.insert("location".to_string(), self.location.clone());
        metadata.insert("timestamp".to_string(), unix_now_secs().to_string());
        Message::MetadataResponse { metadata }
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
