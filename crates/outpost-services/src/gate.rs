//! Detect gate — turns raw prediction vectors into throttled detect events.
//!
//! The gate is the only writer of the dedup state. Repeat detections of the
//! same class inside the debounce window merge into the prior event (the
//! window slides forward); everything else that qualifies becomes a fresh
//! detect event with its own uid.

use outpost_core::{DetectEvent, DetectMetadata};
use parking_lot::Mutex;
use uuid::Uuid;

/// Repeated same-class detections closer together than this are merged.
pub const DEBOUNCE_WINDOW_SECS: f64 = 1.0;

/// Classifier head labels. Index 0 is the model's "no action" output;
/// indices past the table are treated the same way.
fn class_label(index: usize) -> Option<&'static str> {
    match index {
        1 => Some("theft"),
        2 => Some("assault"),
        3 => Some("shooting"),
        _ => None,
    }
}

/// Arg-max with a strict `>` scan in index order, so the first index
/// attaining the maximum wins ties.
fn arg_max(probabilities: &[f64]) -> Option<(usize, f64)> {
    let mut winner: Option<(usize, f64)> = None;
    for (index, &p) in probabilities.iter().enumerate() {
        match winner {
            Some((_, best)) if p > best => winner = Some((index, p)),
            None => winner = Some((index, p)),
            _ => {}
        }
    }
    winner
}

#[derive(Default)]
struct GateState {
    last_kind: Option<&'static str>,
    last_seen: Option<f64>,
}

/// Shared across every dispatcher connection; the lock serializes the
/// debounce decision so no two connections evaluate a stale snapshot.
pub struct DetectGate {
    state: Mutex<GateState>,
    location: String,
}

impl DetectGate {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            location: location.into(),
        }
    }

    /// Evaluate one prediction vector. Returns the detect event to publish
    /// when the prediction starts a new qualifying event, `None` otherwise.
    pub fn evaluate(&self, probabilities: &[f64], timestamp: f64) -> Option<DetectEvent> {
        let Some((index, probability)) = arg_max(probabilities) else {
            tracing::warn!("empty probability vector");
            return None;
        };
        let Some(label) = class_label(index) else {
            tracing::debug!(index, "prediction resolved to no action");
            return None;
        };
        if timestamp == 0.0 || !timestamp.is_finite() {
            tracing::warn!(label, "prediction carries no usable timestamp");
            return None;
        }

        let mut state = self.state.lock();
        if state.last_kind == Some(label) {
            if let Some(last_seen) = state.last_seen {
                if timestamp - last_seen < DEBOUNCE_WINDOW_SECS {
                    state.last_seen = Some(timestamp);
                    tracing::debug!(label, "repeat detection inside debounce window");
                    return None;
                }
            }
        }

        state.last_kind = Some(label);
        state.last_seen = Some(timestamp);

        let event = DetectEvent {
            detect_type: label.to_string(),
            metadata: DetectMetadata {
                uid: Uuid::new_v4().to_string(),
                timestamp,
                location: self.location.clone(),
                probability,
            },
        };
        tracing::info!(label, uid = %event.metadata.uid, "new detect event");
        Some(event)
    }
}
