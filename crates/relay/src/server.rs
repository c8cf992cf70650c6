// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Handles the handshake, heartbeat replies, and broadcast fanout.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use tether_core::ControlFrame;

use crate::state::RelayState;

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: RelayState) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state).await?;
    Ok(())
}

/// Accept connections on a bound listener until it fails.
pub(crate) async fn serve(listener: TcpListener, state: RelayState) -> std::io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// What to do with one inbound text frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    /// Answer the sender directly.
    Reply(String),
    /// Fan out to every other client.
    Relay,
    /// Swallow: heartbeat replies and handshakes are not relayed.
    Ignore,
}

/// Classifies an inbound text frame.
pub(crate) fn classify(text: &str) -> Result<Inbound, serde_json::Error> {
    match ControlFrame::parse(text) {
        Some(ControlFrame::Ping { timestamp }) => {
            Ok(Inbound::Reply(ControlFrame::pong(Some(timestamp)).to_json()?))
        }
        Some(_) => Ok(Inbound::Ignore),
        None => Ok(Inbound::Relay),
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: RelayState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let client = state.join();
    info!("New WebSocket connection from: {} (client {})", peer_addr, client);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    // Subscribe before the handshake so nothing published after it is missed
    let mut broadcast_rx = state.subscribe();

    let greeting = ControlFrame::connected(Some(format!("client-{client}"))).to_json()?;
    let result = async {
        ws_sink.send(Message::Text(greeting.into())).await?;

        loop {
            tokio::select! {
                // Handle incoming frames from client
                msg = ws_stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match classify(text.as_str())? {
                            Inbound::Reply(reply) => {
                                ws_sink.send(Message::Text(reply.into())).await?;
                            }
                            Inbound::Relay => {
                                let receivers = state.publish(client, text.as_str().to_owned());
                                debug!("client {} relayed a frame to {} receivers", client, receivers.saturating_sub(1));
                            }
                            Inbound::Ignore => {}
                        },
                        Some(Ok(Message::Close(_))) => {
                            info!("Client {} disconnected", peer_addr);
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(_)) => {
                            // Ignore other message types (Binary, Pong, Frame)
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error from {}: {}", peer_addr, e);
                            break;
                        }
                        None => {
                            info!("Client {} stream ended", peer_addr);
                            break;
                        }
                    }
                }

                // Forward frames relayed by other clients
                broadcast = broadcast_rx.recv() => {
                    match broadcast {
                        Ok(relayed) if relayed.from == client => {}
                        Ok(relayed) => {
                            if let Err(e) = ws_sink.send(Message::Text(relayed.text.into())).await {
                                warn!("Failed to send broadcast to {}: {}", peer_addr, e);
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!("Client {} lagged by {} messages", peer_addr, n);
                        }
                        Err(RecvError::Closed) => {
                            break;
                        }
                    }
                }
            }
        }
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    }
    .await;

    state.leave();
    info!("Connection closed: {}", peer_addr);
    result
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
