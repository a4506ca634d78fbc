//! Prediction sender — decouples artifact production from network send.
//!
//! Producers enqueue (artifact, probabilities) pairs without blocking. The
//! worker drains the queue one item at a time over one persistent
//! dispatcher connection: send, await the paired response, correlate the
//! returned uid back to the artifact. Strictly sequential — the next item
//! is not sent until the previous one has fully round-tripped.

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use outpost_core::message::FRAME_DELIMITER;
use outpost_core::Message;

use crate::artifacts::ArtifactStore;

/// One queued prediction awaiting its round-trip.
pub struct QueueItem {
    pub artifact: Bytes,
    pub probabilities: Vec<f64>,
}

/// Producer-side enqueue handle.
#[derive(Clone)]
pub struct PredictionSender {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl PredictionSender {
    /// Create a handle and the queue the worker drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueueItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Non-blocking; ownership of the artifact passes to the worker.
    pub fn enqueue(&self, artifact: Bytes, probabilities: Vec<f64>) {
        let item = QueueItem {
            artifact,
            probabilities,
        };
        if self.tx.send(item).is_err() {
            tracing::warn!("sender worker gone, prediction dropped");
        }
    }
}

pub struct SenderWorker {
    dispatcher_addr: String,
    store: ArtifactStore,
    queue: mpsc::UnboundedReceiver<QueueItem>,
    shutdown: broadcast::Receiver<()>,
    max_attempts: u32,
    connection: Option<BufReader<TcpStream>>,
}

impl SenderWorker {
    pub fn new(
        dispatcher_addr: impl Into<String>,
        store: ArtifactStore,
        queue: mpsc::UnboundedReceiver<QueueItem>,
        shutdown: broadcast::Receiver<()>,
        max_attempts: u32,
    ) -> Self {
        Self {
            dispatcher_addr: dispatcher_addr.into(),
            store,
            queue,
            shutdown,
            max_attempts,
            connection: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("prediction sender shutting down");
                    return Ok(());
                }

                item = self.queue.recv() => {
                    let Some(item) = item else {
                        tracing::info!("enqueue handles dropped, sender exiting");
                        return Ok(());
                    };
                    self.round_trip(item).await;
                }
            }
        }
    }

    /// Send one item and correlate its response. Transport failures retry
    /// with a fresh connection, up to the attempt budget; an item that
    /// exhausts the budget is dropped so the queue keeps moving.
    async fn round_trip(&mut self, item: QueueItem) {
        let message = Message::Predictions {
            probabilities: item.probabilities.clone(),
            timestamp: unix_now_secs(),
        };
        let frame = message.to_frame();

        for attempt in 1..=self.max_attempts {
            match self.try_send(&frame).await {
                Ok(raw) => {
                    match Message::from_bytes(&raw) {
                        Ok(response) => self.correlate(&item, response),
                        Err(e) => tracing::error!(error = %e, "bad response from dispatcher"),
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "prediction send failed");
                }
            }
        }
        tracing::error!(
            attempts = self.max_attempts,
            "prediction dropped after exhausting send attempts"
        );
    }

    async fn try_send(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let mut conn = match self.connection.take() {
            Some(conn) => conn,
            None => {
                let stream = TcpStream::connect(&self.dispatcher_addr)
                    .await
                    .with_context(|| {
                        format!("failed to connect to dispatcher at {}", self.dispatcher_addr)
                    })?;
                BufReader::new(stream)
            }
        };

        conn.get_mut()
            .write_all(frame)
            .await
            .context("failed to send prediction frame")?;

        let mut response = Vec::new();
        let read = conn
            .read_until(FRAME_DELIMITER, &mut response)
            .await
            .context("failed to read model response")?;
        if read == 0 {
            anyhow::bail!("dispatcher closed the connection before responding");
        }

        // The connection is only kept after a clean round-trip; any failure
        // above dropped it, so the next attempt dials fresh.
        self.connection = Some(conn);
        Ok(response)
    }

    fn correlate(&self, item: &QueueItem, response: Message) {
        match response {
            Message::ModelResponse { uid: Some(uid) } => {
                tracing::debug!(%uid, "saving artifact for published event");
                if let Err(e) = self.store.save(&uid, &item.artifact) {
                    tracing::error!(%uid, error = %e, "artifact save failed");
                }
            }
            Message::ModelResponse { uid: None } => {
                tracing::debug!("no event published for prediction");
            }
            other => {
                tracing::warn!(kind = other.kind(), "unexpected response to predictions");
            }
        }
    }
}

fn unix_now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
