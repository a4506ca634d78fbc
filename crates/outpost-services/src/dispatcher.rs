//! Local dispatcher — accepts producer connections and routes frames.
//!
//! One task per accepted connection; each task owns its stream exclusively.
//! Frames are newline-delimited JSON. A frame that fails to decode is
//! dropped with a warning and the connection keeps going; only transport
//! errors end a connection, and only that connection.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use outpost_core::message::FRAME_DELIMITER;
use outpost_core::Message;

use crate::router::MessageRouter;

pub struct Dispatcher {
    listener: TcpListener,
    router: Arc<MessageRouter>,
    shutdown: broadcast::Receiver<()>,
}

impl Dispatcher {
    /// Wrap a pre-bound listener. Callers bind (port 0 works for tests) so
    /// the daemon and the test harness share one construction path.
    pub fn new(
        listener: TcpListener,
        router: Arc<MessageRouter>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            router,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(mut self) -> Result<()> {
        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("dispatcher shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            tracing::info!(%addr, "producer connected");
                            let router = self.router.clone();
                            let shutdown = self.shutdown.resubscribe();
                            connections.spawn(async move {
                                if let Err(e) = serve_connection(stream, router, shutdown).await {
                                    tracing::warn!(%addr, error = %e, "connection ended with error");
                                }
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "accept failed"),
                    }

                    // Lazy bookkeeping: reap whatever already finished.
                    while connections.try_join_next().is_some() {}
                }
            }
        }

        // Every connection task observes the same shutdown signal; wait for
        // them rather than aborting mid-frame.
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    router: Arc<MessageRouter>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut frame: Vec<u8> = Vec::new();

    loop {
        frame.clear();
        let read = tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            read = reader.read_until(FRAME_DELIMITER, &mut frame) => read?,
        };

        if read == 0 {
            tracing::info!(%peer, "producer closed connection");
            let _ = write_half.shutdown().await;
            return Ok(());
        }

        let message = match Message::from_bytes(&frame) {
            Ok(m) => m,
            Err(e) => {
                // One bad frame must not cost the whole session.
                tracing::warn!(%peer, error = %e, "dropping unparsable frame");
                continue;
            }
        };

        tracing::debug!(%peer, kind = message.kind(), "frame received");
        if let Some(response) = router.route(message).await {
            write_half.write_all(&response.to_frame()).await?;
        }
    }
}
