//! This module contains the one-shot client commands.
use super::args::{QueryArgs, SendArgs};
use crate::client::{BridgeClient, Delivery, RetryPolicy};
use crate::types::{LogEvent, Phase};
use anyhow::{bail, Context, Result};
use tracing::warn;

/// Sends a single event and reports the outcome.
///
/// An event that cannot be delivered, because the bridge is unreachable or
/// drops the connection, is saved to the pending file.
///
/// # Errors
///
/// This function will return an error if the event was not acknowledged or
/// the bridge rejects it.
pub async fn send(args: SendArgs) -> Result<()> {
    send_with_policy(args, &RetryPolicy::reconnect()).await
}

async fn send_with_policy(args: SendArgs, policy: &RetryPolicy) -> Result<()> {
    let mut client = BridgeClient::new(args.addr);
    if let Err(e) = client.reconnect(policy).await {
        warn!("Cannot reach bridge at {}: {}", client.addr(), e);
    }

    let phase = Phase::from(args.phase);
    let delivery = match (args.timestamp, phase) {
        (Some(timestamp), _) => {
            let event = LogEvent::new(timestamp, args.source_id, args.operation, args.details);
            client.send_event(phase, event).await
        }
        (None, Phase::Start) => {
            client
                .log_start(&args.source_id, &args.operation, args.details)
                .await
        }
        (None, Phase::End) => {
            client
                .log_end(&args.source_id, &args.operation, args.details)
                .await
        }
    };

    match delivery {
        Delivery::Sent => {
            println!("OK");
            Ok(())
        }
        Delivery::Rejected(reason) => bail!("Bridge rejected event: {}", reason),
        Delivery::Queued => {
            client.save_pending(&args.pending_file)?;
            bail!(
                "Event not delivered to {}; {} event(s) saved to {}",
                client.addr(),
                client.pending(),
                args.pending_file
            )
        }
    }
}

/// Prints the records held by the bridge, one per line, or wipes them.
///
/// # Errors
///
/// This function will return an error if the bridge cannot be reached or
/// does not expose queries.
pub async fn query(args: QueryArgs) -> Result<()> {
    let clear = args.clear;
    let records = run_query(args).await?;

    if clear {
        println!("Logs cleared");
    }
    for record in &records {
        println!("{}", record);
    }
    Ok(())
}

/// Returns the requested records, or nothing after a wipe.
async fn run_query(args: QueryArgs) -> Result<Vec<String>> {
    let mut client = BridgeClient::new(args.addr);
    client
        .connect()
        .await
        .with_context(|| format!("Cannot reach bridge at {}", client.addr()))?;

    if args.clear {
        client.clear_logs().await?;
        return Ok(Vec::new());
    }

    let records = match args.source_id.as_deref() {
        Some(source_id) => client.get_logs_for(source_id).await?,
        None => client.get_all_logs().await?,
    };
    Ok(records)
}
