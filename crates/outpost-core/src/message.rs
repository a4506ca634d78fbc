//! Outpost message protocol — on-wire types for edge ↔ cloud traffic.
//!
//! Every payload is a UTF-8 JSON object carrying a `kind` discriminator plus
//! the variant's fields. The `Message` enum IS the registry: serde's tag
//! dispatch replaces any trial-order decoding, so an unknown `kind` or a
//! missing required field fails as a whole rather than matching a wrong
//! variant.
//!
//! On the local transport, frames are newline-delimited: one JSON object per
//! `\n`-terminated line. [`Message::to_frame`] produces a full frame;
//! [`Message::from_bytes`] accepts a frame with or without its delimiter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Transport constants ───────────────────────────────────────────────────────

/// Loopback host the local dispatcher binds by default.
pub const DISPATCH_HOST: &str = "127.0.0.1";

/// Default dispatcher port (0xBEEF).
pub const DISPATCH_PORT: u16 = 0xBEEF;

/// Frame delimiter on the local stream transport.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Cloud bridge channel names.
pub mod topics {
    /// Inbound control channel.
    pub const CONTROL: &str = "dev/test01";
    /// Inbound data requests (file uploads, metadata, queries).
    pub const DATA_REQUEST: &str = "dev/data/request";
    /// Outbound detect events.
    pub const DETECT: &str = "dev/detect";
    /// Outbound responses to data requests.
    pub const DATA_RESPONSE: &str = "dev/data/response";
}

// ── Payload types ─────────────────────────────────────────────────────────────

/// Metadata attached to every detect event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectMetadata {
    /// Opaque event id, unique per published event.
    pub uid: String,
    /// Event time in seconds.
    pub timestamp: f64,
    /// Where the device reporting the event is installed.
    pub location: String,
    /// Winning class probability that triggered the event.
    pub probability: f64,
}

/// A detect event payload — the body of a `detect` message, and the element
/// type of `query-response.results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectEvent {
    pub detect_type: String,
    pub metadata: DetectMetadata,
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// A protocol message. The `kind` field on the wire selects the variant;
/// each variant's fields are required unless typed `Option`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Message {
    /// Raw model output from the inference producer.
    Predictions {
        /// Class-indexed probability vector.
        probabilities: Vec<f64>,
        /// Capture time in seconds.
        timestamp: f64,
    },

    /// A qualifying detection, published to the cloud.
    Detect(DetectEvent),

    /// Dispatcher reply to `predictions`. `uid` is absent when no event was
    /// published for the prediction.
    ModelResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uid: Option<String>,
    },

    MetadataRequest {
        device_id: String,
    },

    MetadataResponse {
        metadata: BTreeMap<String, String>,
    },

    /// Cloud asks the device to upload a local file to storage.
    FileRequest {
        filename: String,
        upload_url: String,
        headers: BTreeMap<String, String>,
    },

    /// HTTP status of a requested upload.
    FileResponse {
        status: u16,
    },

    QueryRequest {
        detect_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },

    QueryResponse {
        results: Vec<DetectEvent>,
    },

    /// References a stored clip by event id.
    DetectData {
        uid: String,
    },

    /// Cloud-side push notification instruction.
    SendPush {
        push_type: String,
        recipient: String,
    },
}

impl Message {
    /// Serialize to a JSON payload, without the frame delimiter.
    ///
    /// Never fails for well-formed in-memory messages: every field type here
    /// serializes infallibly.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("message serialization failed")
    }

    /// Serialize to a complete `\n`-terminated frame for the local transport.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = self.to_bytes();
        frame.push(FRAME_DELIMITER);
        frame
    }

    /// Decode one payload. A trailing delimiter or surrounding whitespace is
    /// tolerated; anything else that does not match exactly one registered
    /// variant is a [`CodecError`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(data).map_err(CodecError::NoMatch)
    }

    /// The wire discriminator for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Predictions { .. } => "predictions",
            Message::Detect(_) => "detect",
            Message::ModelResponse { .. } => "model-response",
            Message::MetadataRequest { .. } => "metadata-request",
            Message::MetadataResponse { .. } => "metadata-response",
            Message::FileRequest { .. } => "file-request",
            Message::FileResponse { .. } => "file-response",
            Message::QueryRequest { .. } => "query-request",
            Message::QueryResponse { .. } => "query-response",
            Message::DetectData { .. } => "detect-data",
            Message::SendPush { .. } => "send-push",
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A payload failed to decode as any registered message variant.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unrecognized message payload: {0}")]
    NoMatch(#[source] serde_json::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
