//! Cloud inbound worker — routes cloud-originated requests through the
//! local handlers.
//!
//! Requests arrive as raw publications from the MQTT worker. Anything that
//! decodes goes through the same [`MessageRouter`] as dispatcher traffic;
//! a produced response is published back on the data-response topic.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};

use outpost_core::message::topics;
use outpost_core::Message;

use crate::bridge::{BridgeHandle, Publication};
use crate::router::MessageRouter;

pub struct CloudWorker {
    router: Arc<MessageRouter>,
    bridge: BridgeHandle,
    inbound: mpsc::UnboundedReceiver<Publication>,
    shutdown: broadcast::Receiver<()>,
}

impl CloudWorker {
    pub fn new(
        router: Arc<MessageRouter>,
        bridge: BridgeHandle,
        inbound: mpsc::UnboundedReceiver<Publication>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            router,
            bridge,
            inbound,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("cloud worker shutting down");
                    return Ok(());
                }

                publication = self.inbound.recv() => {
                    let Some(publication) = publication else {
                        tracing::info!("bridge inbound closed, cloud worker exiting");
                        return Ok(());
                    };
                    self.handle(publication).await;
                }
            }
        }
    }

    async fn handle(&self, publication: Publication) {
        let message = match Message::from_bytes(&publication.payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(topic = %publication.topic, error = %e, "unparsable cloud message");
                return;
            }
        };

        tracing::debug!(topic = %publication.topic, kind = message.kind(), "cloud request");
        if let Some(response) = self.router.route(message).await {
            self.bridge.publish(topics::DATA_RESPONSE, &response);
        }
    }
}
