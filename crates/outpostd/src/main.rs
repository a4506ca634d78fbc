//! outpostd — Outpost edge dispatcher daemon.
//!
//! Owns the three long-running pieces: the local TCP dispatcher the
//! inference producer talks to, the MQTT bridge to the cloud control plane,
//! and the worker that turns cloud requests into local handler calls.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use outpost_core::config::OutpostConfig;
use outpost_services::{
    BridgeHandle, CloudWorker, DetectGate, DetectLog, Dispatcher, FileUploader, MessageRouter,
    MqttBridge,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = OutpostConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = OutpostConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        OutpostConfig::default()
    });

    tracing::info!(
        device_id = %config.device.device_id,
        location = %config.device.location,
        "outpostd starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Cloud bridge ─────────────────────────────────────────────────────────
    // Bridge startup is the one fatal path: bad credentials must not leave
    // the daemon half-connected.
    let (bridge, outbound) = BridgeHandle::channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let mqtt = MqttBridge::new(&config.cloud, outbound, inbound_tx, shutdown_tx.subscribe())
        .context("cloud bridge initialization failed")?;

    // ── Handlers ─────────────────────────────────────────────────────────────
    let router = Arc::new(MessageRouter::new(
        DetectGate::new(config.device.location.clone()),
        DetectLog::new(),
        bridge.clone(),
        FileUploader::new(config.storage.upload_dir.clone()),
        config.device.device_id.clone(),
        config.device.location.clone(),
    ));

    // ── Local dispatcher ─────────────────────────────────────────────────────
    let bind_addr = config.network.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind dispatcher on {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "dispatcher listening");

    // ── Spawn tasks ──────────────────────────────────────────────────────────
    let dispatcher_task =
        tokio::spawn(Dispatcher::new(listener, router.clone(), shutdown_tx.subscribe()).run());

    let bridge_task = tokio::spawn(mqtt.run());

    let cloud_task =
        tokio::spawn(CloudWorker::new(router, bridge, inbound_rx, shutdown_tx.subscribe()).run());

    // ── Wait for exit ────────────────────────────────────────────────────────
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = dispatcher_task => tracing::error!("dispatcher exited: {:?}", r),
        r = bridge_task     => tracing::error!("cloud bridge exited: {:?}", r),
        r = cloud_task      => tracing::error!("cloud worker exited: {:?}", r),
    }

    Ok(())
}
