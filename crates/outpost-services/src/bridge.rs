//! Cloud bridge — fire-and-forget publishing plus the MQTT worker that
//! actually moves traffic.
//!
//! Handlers publish through a [`BridgeHandle`]; delivery, reconnection and
//! broker QoS are the worker's problem. Inbound publishes on the subscribed
//! request topics are forwarded to whoever holds the inbound receiver
//! (normally the [`crate::cloud::CloudWorker`]).

use std::time::Duration;

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::{broadcast, mpsc};

use outpost_core::config::CloudConfig;
use outpost_core::message::topics;
use outpost_core::Message;

/// One publication crossing the bridge, in either direction.
#[derive(Debug, Clone)]
pub struct Publication {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Cloneable publish handle over the outbound queue.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<Publication>,
}

impl BridgeHandle {
    /// Create a handle and the outbound queue it feeds. The receiver goes to
    /// the MQTT worker (or straight to a test).
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Publication>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for publication. Never blocks; a missing worker is
    /// logged and the publication dropped.
    pub fn publish(&self, topic: &str, message: &Message) {
        let publication = Publication {
            topic: topic.to_string(),
            payload: message.to_bytes(),
        };
        if self.tx.send(publication).is_err() {
            tracing::warn!(topic, "bridge worker gone, publication dropped");
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Bridge startup failures. Fatal: a bridge that cannot authenticate must
/// not come up half-configured.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("cloud endpoint is not configured")]
    MissingEndpoint,
    #[error("missing credential file: {0}")]
    MissingCredential(std::path::PathBuf),
}

// ── MQTT worker ───────────────────────────────────────────────────────────────

pub struct MqttBridge {
    client: AsyncClient,
    eventloop: rumqttc::EventLoop,
    outbound: mpsc::UnboundedReceiver<Publication>,
    inbound: mpsc::UnboundedSender<Publication>,
    shutdown: broadcast::Receiver<()>,
}

impl MqttBridge {
    /// Validate configuration and construct the MQTT client. Credential
    /// material stays opaque — only presence is checked here; the broker
    /// session consumes it at connect time.
    pub fn new(
        config: &CloudConfig,
        outbound: mpsc::UnboundedReceiver<Publication>,
        inbound: mpsc::UnboundedSender<Publication>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self, BridgeError> {
        if config.endpoint.is_empty() {
            return Err(BridgeError::MissingEndpoint);
        }
        for path in [&config.ca_path, &config.cert_path, &config.key_path] {
            if !path.exists() {
                return Err(BridgeError::MissingCredential(path.clone()));
            }
        }

        let mut options = MqttOptions::new(&config.client_id, &config.endpoint, config.port);
        options.set_keep_alive(Duration::from_secs(15));
        let (client, eventloop) = AsyncClient::new(options, 10);

        Ok(Self {
            client,
            eventloop,
            outbound,
            inbound,
            shutdown,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let MqttBridge {
            client,
            mut eventloop,
            mut outbound,
            inbound,
            mut shutdown,
        } = self;

        client.subscribe(topics::CONTROL, QoS::AtLeastOnce).await?;
        client
            .subscribe(topics::DATA_REQUEST, QoS::AtLeastOnce)
            .await?;

        // Outbound pump runs beside the event loop so a slow publish can
        // never stall connection keep-alive.
        let pump_client = client.clone();
        let mut pump_shutdown = shutdown.resubscribe();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_shutdown.recv() => return,

                    publication = outbound.recv() => {
                        let Some(Publication { topic, payload }) = publication else {
                            tracing::info!("publish handles dropped, outbound pump exiting");
                            return;
                        };
                        match pump_client
                            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
                            .await
                        {
                            Ok(()) => tracing::debug!(topic, "published"),
                            Err(e) => tracing::error!(topic, error = %e, "publish failed"),
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("cloud bridge shutting down");
                    let _ = client.disconnect().await;
                    let _ = pump.await;
                    return Ok(());
                }

                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::Publish(p))) => {
                            tracing::debug!(topic = %p.topic, "cloud publish received");
                            let publication = Publication {
                                topic: p.topic.clone(),
                                payload: p.payload.to_vec(),
                            };
                            if inbound.send(publication).is_err() {
                                tracing::warn!(topic = %p.topic, "no inbound consumer, dropping");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "mqtt connection error, backing off");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        }
    }
}
