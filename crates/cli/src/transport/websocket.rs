// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connector using tokio-tungstenite.
//!
//! The stream half is moved into a reader task that forwards text frames as
//! [`ChannelEvent`]s; protocol-level ping/pong and binary frames are not
//! surfaced.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{BoxFuture, Channel, ChannelEvent, ChannelSink, Connector, TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Buffered events between the reader task and the channel owner.
const EVENT_BUFFER: usize = 256;

/// Opens channels over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        WebSocketConnector
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, url: &str) -> BoxFuture<'_, TransportResult<Channel>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            debug!("websocket open: {}", url);

            let (sink, stream) = ws_stream.split();
            let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
            tokio::spawn(read_frames(stream, event_tx));

            Ok(Channel {
                sink: Box::new(WebSocketSink { sink, closed: false }),
                events,
            })
        })
    }
}

/// Forwards frames until the stream ends or the owner drops the receiver.
async fn read_frames(mut stream: SplitStream<WsStream>, event_tx: mpsc::Sender<ChannelEvent>) {
    loop {
        let event = match stream.next().await {
            Some(Ok(Message::Text(text))) => ChannelEvent::Message(text.as_str().to_owned()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                    None => (None, String::new()),
                };
                let _ = event_tx.send(ChannelEvent::Closed { code, reason }).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                let _ = event_tx.send(ChannelEvent::Error(e.to_string())).await;
                return;
            }
            None => {
                let _ = event_tx
                    .send(ChannelEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    })
                    .await;
                return;
            }
        };
        if event_tx.send(event).await.is_err() {
            return;
        }
    }
}

struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

impl ChannelSink for WebSocketSink {
    fn send(&mut self, text: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.closed {
                return Err(TransportError::ConnectionClosed);
            }
            self.sink
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            // Flush to detect a broken connection on this send, not the next one
            self.sink
                .flush()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            // Peer may already be gone
            let _ = self.sink.close().await;
            Ok(())
        })
    }
}
