//! # WebSocket Room Example
//!
//! Joins a planning poker room on a running hub and prints what happens:
//!
//! 1. Load (or create) the session identity from a JSON file
//! 2. Connect lazily through a shared WebSocket channel
//! 3. Join the room and follow its events until it closes or Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start a hub on localhost:5000, then:
//! POKER_NAME=Ana cargo run --example websocket_room -- a1b2c3
//!
//! # Override the hub URL:
//! POKER_HUB_URL=ws://my-hub:5000/hub cargo run --example websocket_room -- a1b2c3
//! ```
//!
//! Omit the room code to create a fresh one.

use std::sync::Arc;

use planning_poker_client::{
    new_room_code, ChannelConfig, FileIdentityStore, IdentityStore, RoomError, RoomSignal,
    RoomSyncClient, SharedChannel, WebSocketConnector,
};

/// Default hub URL when `POKER_HUB_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:5000/hub";

/// Where the session identity is kept between runs.
const IDENTITY_FILE: &str = "poker-identity.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("POKER_HUB_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let room_id = std::env::args().nth(1).unwrap_or_else(new_room_code);

    let identity = Arc::new(FileIdentityStore::open(IDENTITY_FILE)?);
    if let Ok(name) = std::env::var("POKER_NAME") {
        identity.set_display_name(&name)?;
    }

    let shared = SharedChannel::new(WebSocketConnector::new(&url), ChannelConfig::new());
    tracing::info!("joining room {room_id} on {url}");

    // ── Mount ───────────────────────────────────────────────────────
    let (room, mut signals) =
        match RoomSyncClient::mount(&shared, identity.clone(), Some(&room_id)).await {
            Ok(mounted) => mounted,
            Err(e) if e.requires_redirect() => {
                eprintln!("Set POKER_NAME to choose a display name first ({e}).");
                return Ok(());
            }
            Err(RoomError::Connection(reason)) => {
                eprintln!("Could not reach the hub: {reason}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            signal = signals.recv() => {
                match signal {
                    Some(RoomSignal::Exit(reason)) => {
                        tracing::info!(?reason, "leaving room");
                        break;
                    }
                    Some(RoomSignal::CommandRejected { command, message }) => {
                        tracing::warn!("{command} rejected: {message}");
                    }
                    Some(signal) => {
                        tracing::debug!(?signal, "room signal");
                        let view = room.view();
                        let names: Vec<_> = view.participants().iter().map(|p| p.name.as_str()).collect();
                        println!(
                            "[{}] {:?} | pack {} | me: {:?} | {}",
                            room.room_id(),
                            view.phase,
                            view.active_pack().map_or("unknown", |p| p.id()),
                            view.selected_vote,
                            names.join(", "),
                        );
                        if let Some(summary) = view.snapshot.as_ref().and_then(|s| s.vote_summary()) {
                            println!("  result: {} ({:?})", summary.most_common, summary.distribution);
                        }
                    }
                    None => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received");
                break;
            }
        }
    }

    room.unmount().await;
    shared.disconnect().await;
    Ok(())
}
