//! The main entry point for the event-bridge application.
mod app;
mod bridge;
mod client;
mod service;
mod storage;
mod types;

use anyhow::Result;

/// The main function of the application.
///
/// This function is the entry point for the event-bridge application. It
/// parses command-line arguments and either runs the bridge or performs a
/// one-shot client command against a running bridge.
///
/// # Errors
///
/// Returns an error if the bridge fails to start (the port cannot be bound or
/// the durable log cannot be written) or if a client command fails.
#[tokio::main]
async fn main() -> Result<()> {
    app::launch().await
}
