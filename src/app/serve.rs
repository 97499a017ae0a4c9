//! This module contains the entry point for running the bridge.
use super::setup::PreparedBridge;
use crate::bridge::Bridge;
use crate::service::LocalLoggingService;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Runs the bridge until Ctrl+C is received.
///
/// # Arguments
///
/// * `prepared` - The resolved configuration and the opened store.
///
/// # Errors
///
/// This function will return an error if the listener cannot be bound.
pub async fn run(prepared: PreparedBridge) -> Result<()> {
    let PreparedBridge {
        listen_addr,
        log_file,
        config,
        store,
    } = prepared;

    let service = Arc::new(LocalLoggingService::new(store.clone()));
    let bridge = Bridge::bind(listen_addr.as_str(), service, config).await?;

    println!("📍 Listening on {}", bridge.local_addr()?);
    println!("📁 Writing records to {}", log_file);
    println!("⏰ Waiting for clients...");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            // Keep the sender alive so the bridge is not shut down by accident.
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    bridge.run(shutdown_rx).await?;

    if store.is_empty() {
        info!("No records held in memory at shutdown");
    } else {
        info!("{} record(s) held in memory at shutdown", store.len());
    }
    Ok(())
}
