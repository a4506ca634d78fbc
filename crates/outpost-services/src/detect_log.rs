//! In-memory log of published detect events, keyed by uid.
//!
//! Backs `query-request` handling. Process-lifetime only; the cloud keeps
//! the durable record.

use std::sync::Arc;

use dashmap::DashMap;
use outpost_core::DetectEvent;

#[derive(Clone, Default)]
pub struct DetectLog {
    events: Arc<DashMap<String, DetectEvent>>,
}

impl DetectLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(DashMap::new()),
        }
    }

    pub fn record(&self, event: DetectEvent) {
        self.events.insert(event.metadata.uid.clone(), event);
    }

    pub fn get(&self, uid: &str) -> Option<DetectEvent> {
        self.events.get(uid).map(|e| e.value().clone())
    }

    /// Resolve a query: with a prefix, every event whose uid starts with it;
    /// without one, an exact uid lookup. Results are time-ordered.
    pub fn query(&self, detect_id: &str, prefix: Option<&str>) -> Vec<DetectEvent> {
        let mut results: Vec<DetectEvent> = match prefix {
            Some(p) => self
                .events
                .iter()
                .filter(|e| e.key().starts_with(p))
                .map(|e| e.value().clone())
                .collect(),
            None => self.get(detect_id).into_iter().collect(),
        };
        results.sort_by(|a, b| a.metadata.timestamp.total_cmp(&b.metadata.timestamp));
        results
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
